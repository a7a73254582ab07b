//! Study tools — summaries, flashcards, and quizzes from course
//! material. Three endpoints sharing one validation and pipeline shape.

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
use crate::features::prompts::{FLASHCARDS_PROMPT, QUIZ_PROMPT, STUDY_SYSTEM, SUMMARIZE_PROMPT};
use crate::features::{finish, require_len, tier_for, try_cache, AiResponse};
use crate::state::AppState;

const MATERIAL_MIN: usize = 50;
const MATERIAL_MAX: usize = 20_000;
const DEFAULT_QUIZ_QUESTIONS: u32 = 5;
const DEFAULT_FLASHCARDS: u32 = 10;

#[derive(Debug, Deserialize)]
pub struct StudyRequest {
    pub user_id: Uuid,
    pub material: String,
    /// Quiz question count or flashcard count, depending on endpoint.
    pub count: Option<u32>,
    #[serde(default)]
    pub premium: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySummary {
    pub summary: String,
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashcardSet {
    pub flashcards: Vec<Flashcard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer_index: u32,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub questions: Vec<QuizQuestion>,
}

fn validate_material(req: &StudyRequest) -> Result<(), AppError> {
    require_len("material", &req.material, MATERIAL_MIN, MATERIAL_MAX)
}

fn validate_count(count: Option<u32>, default: u32, max: u32) -> Result<u32, AppError> {
    let count = count.unwrap_or(default);
    if count == 0 || count > max {
        return Err(AppError::Validation(format!(
            "count must be between 1 and {max}"
        )));
    }
    Ok(count)
}

/// POST /api/v1/study/summarize
pub async fn handle_summarize(
    State(state): State<AppState>,
    Json(req): Json<StudyRequest>,
) -> Result<Json<AiResponse>, AppError> {
    validate_material(&req)?;
    state
        .quota
        .check(req.user_id, "study_summary", tier_for(req.premium))
        .await?;

    let hash = input_hash(&json!({"material": req.material, "tool": "summary"}));
    if let Some(hit) = try_cache(&state, CacheKind::StudySummary, &hash, req.user_id).await {
        return Ok(Json(hit));
    }

    let prompt = render(
        SUMMARIZE_PROMPT,
        &HashMap::from([("material", req.material.as_str())]),
    );

    let mut opts = GenerateOptions::new("study_summary");
    opts.system_instruction = Some(STUDY_SYSTEM);
    opts.required_fields = &["summary", "key_points"];
    opts.user_id = Some(req.user_id);
    opts.input_hash = &hash;

    let generated: Generated<StudySummary> = state.orchestrator.generate(&prompt, &opts).await?;

    let response = finish(
        &state,
        CacheKind::StudySummary,
        &hash,
        req.user_id,
        &req.material,
        generated,
    )
    .await?;
    Ok(Json(response))
}

/// POST /api/v1/study/flashcards
pub async fn handle_flashcards(
    State(state): State<AppState>,
    Json(req): Json<StudyRequest>,
) -> Result<Json<AiResponse>, AppError> {
    validate_material(&req)?;
    let count = validate_count(req.count, DEFAULT_FLASHCARDS, 50)?;
    state
        .quota
        .check(req.user_id, "flashcards", tier_for(req.premium))
        .await?;

    let hash = input_hash(&json!({"material": req.material, "tool": "flashcards", "count": count}));
    if let Some(hit) = try_cache(&state, CacheKind::Flashcards, &hash, req.user_id).await {
        return Ok(Json(hit));
    }

    let count_str = count.to_string();
    let prompt = render(
        FLASHCARDS_PROMPT,
        &HashMap::from([
            ("material", req.material.as_str()),
            ("count", count_str.as_str()),
        ]),
    );

    let mut opts = GenerateOptions::new("flashcards");
    opts.system_instruction = Some(STUDY_SYSTEM);
    opts.required_fields = &["flashcards"];
    opts.user_id = Some(req.user_id);
    opts.input_hash = &hash;

    let generated: Generated<FlashcardSet> = state.orchestrator.generate(&prompt, &opts).await?;

    let response = finish(
        &state,
        CacheKind::Flashcards,
        &hash,
        req.user_id,
        &req.material,
        generated,
    )
    .await?;
    Ok(Json(response))
}

/// POST /api/v1/study/quiz
pub async fn handle_quiz(
    State(state): State<AppState>,
    Json(req): Json<StudyRequest>,
) -> Result<Json<AiResponse>, AppError> {
    validate_material(&req)?;
    let count = validate_count(req.count, DEFAULT_QUIZ_QUESTIONS, 20)?;
    state
        .quota
        .check(req.user_id, "quiz", tier_for(req.premium))
        .await?;

    let hash = input_hash(&json!({"material": req.material, "tool": "quiz", "count": count}));
    if let Some(hit) = try_cache(&state, CacheKind::Quiz, &hash, req.user_id).await {
        return Ok(Json(hit));
    }

    let count_str = count.to_string();
    let prompt = render(
        QUIZ_PROMPT,
        &HashMap::from([
            ("material", req.material.as_str()),
            ("count", count_str.as_str()),
        ]),
    );

    let mut opts = GenerateOptions::new("quiz");
    opts.system_instruction = Some(STUDY_SYSTEM);
    opts.required_fields = &["questions"];
    opts.user_id = Some(req.user_id);
    opts.input_hash = &hash;

    let generated: Generated<Quiz> = state.orchestrator.generate(&prompt, &opts).await?;

    let response = finish(
        &state,
        CacheKind::Quiz,
        &hash,
        req.user_id,
        &req.material,
        generated,
    )
    .await?;
    Ok(Json(response))
}
