//! Skill roadmap — week-by-week learning plan toward a goal role.

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::ai::hash::input_hash;
use crate::ai::orchestrator::{Generated, GenerateOptions};
use crate::ai::template::render;
use crate::cache::CacheKind;
use crate::errors::AppError;
use crate::features::prompts::{SKILLS_PROMPT, SKILLS_SYSTEM};
use crate::features::{finish, require_len, tier_for, try_cache, AiResponse};
use crate::state::AppState;

const FEATURE: &str = "skill_roadmap";
const MAX_SKILLS: usize = 50;

#[derive(Debug, Deserialize)]
pub struct RoadmapRequest {
    pub user_id: Uuid,
    pub current_skills: Vec<String>,
    pub goal_role: String,
    #[serde(default)]
    pub premium: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadmapPhase {
    pub title: String,
    pub weeks: u32,
    pub skills: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRoadmap {
    pub phases: Vec<RoadmapPhase>,
    pub estimated_weeks: u32,
}

fn validate(req: &RoadmapRequest) -> Result<(), AppError> {
    if req.current_skills.is_empty() {
        return Err(AppError::Validation(
            "current_skills must list at least one skill".to_string(),
        ));
    }
    if req.current_skills.len() > MAX_SKILLS {
        return Err(AppError::Validation(format!(
            "current_skills must list at most {MAX_SKILLS} skills"
        )));
    }
    for skill in &req.current_skills {
        require_len("current_skills entry", skill, 1, 60)?;
    }
    require_len("goal_role", &req.goal_role, 2, 100)?;
    Ok(())
}

/// POST /api/v1/skills/roadmap
pub async fn handle_roadmap(
    State(state): State<AppState>,
    Json(req): Json<RoadmapRequest>,
) -> Result<Json<AiResponse>, AppError> {
    validate(&req)?;
    state
        .quota
        .check(req.user_id, FEATURE, tier_for(req.premium))
        .await?;

    let hash = input_hash(&json!({
        "current_skills": req.current_skills,
        "goal_role": req.goal_role,
    }));

    if let Some(hit) = try_cache(&state, CacheKind::SkillRoadmap, &hash, req.user_id).await {
        return Ok(Json(hit));
    }

    let skills_list = req.current_skills.join(", ");
    let prompt = render(
        SKILLS_PROMPT,
        &HashMap::from([
            ("current_skills", skills_list.as_str()),
            ("goal_role", req.goal_role.as_str()),
        ]),
    );

    let mut opts = GenerateOptions::new(FEATURE);
    opts.system_instruction = Some(SKILLS_SYSTEM);
    opts.required_fields = &["phases", "estimated_weeks"];
    opts.user_id = Some(req.user_id);
    opts.input_hash = &hash;

    let generated: Generated<SkillRoadmap> = state.orchestrator.generate(&prompt, &opts).await?;

    let response = finish(
        &state,
        CacheKind::SkillRoadmap,
        &hash,
        req.user_id,
        &skills_list,
        generated,
    )
    .await?;
    Ok(Json(response))
}
