//! Resume analysis — scores a resume against a target role.

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
use crate::features::prompts::{RESUME_PROMPT, RESUME_SYSTEM};
use crate::features::{finish, require_len, tier_for, try_cache, AiResponse};
use crate::state::AppState;

const FEATURE: &str = "resume_analysis";
const DEFAULT_TARGET_ROLE: &str = "a role matching this resume";

#[derive(Debug, Deserialize)]
pub struct ResumeAnalyzeRequest {
    pub user_id: Uuid,
    pub resume_text: String,
    pub target_role: Option<String>,
    #[serde(default)]
    pub premium: bool,
}

/// Parsed analysis; the orchestrator has already verified the required
/// fields are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeAnalysis {
    pub score: u32,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<String>,
    pub summary: Option<String>,
}

fn validate(req: &ResumeAnalyzeRequest) -> Result<(), AppError> {
    require_len("resume_text", &req.resume_text, 100, 15_000)?;
    if let Some(role) = &req.target_role {
        require_len("target_role", role, 2, 100)?;
    }
    Ok(())
}

/// POST /api/v1/resume/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    Json(req): Json<ResumeAnalyzeRequest>,
) -> Result<Json<AiResponse>, AppError> {
    validate(&req)?;
    state
        .quota
        .check(req.user_id, FEATURE, tier_for(req.premium))
        .await?;

    let target_role = req.target_role.as_deref().unwrap_or(DEFAULT_TARGET_ROLE);
    let hash = input_hash(&json!({
        "resume_text": req.resume_text,
        "target_role": target_role,
    }));

    if let Some(hit) = try_cache(&state, CacheKind::ResumeAnalysis, &hash, req.user_id).await {
        return Ok(Json(hit));
    }

    let prompt = render(
        RESUME_PROMPT,
        &HashMap::from([
            ("resume_text", req.resume_text.as_str()),
            ("target_role", target_role),
        ]),
    );

    let mut opts = GenerateOptions::new(FEATURE);
    opts.system_instruction = Some(RESUME_SYSTEM);
    opts.required_fields = &["score", "strengths", "weaknesses", "suggestions"];
    opts.user_id = Some(req.user_id);
    opts.input_hash = &hash;

    let generated: Generated<ResumeAnalysis> = state.orchestrator.generate(&prompt, &opts).await?;

    let response = finish(
        &state,
        CacheKind::ResumeAnalysis,
        &hash,
        req.user_id,
        &req.resume_text,
        generated,
    )
    .await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedResult;
    use crate::features::testing::{
        state_with, FakeCreditGate, FakeQuotaGate, FixedClient, MemoryCache,
    };
    use chrono::Utc;

    fn request(resume_text: &str, target_role: Option<&str>) -> ResumeAnalyzeRequest {
        ResumeAnalyzeRequest {
            user_id: Uuid::new_v4(),
            resume_text: resume_text.to_string(),
            target_role: target_role.map(String::from),
            premium: false,
        }
    }

    #[test]
    fn test_validate_rejects_short_resume() {
        let err = validate(&request("too short", None)).unwrap_err();
        assert!(err.to_string().contains("resume_text"));
    }

    #[test]
    fn test_validate_accepts_reasonable_resume() {
        let text = "experience line ".repeat(20);
        assert!(validate(&request(&text, Some("Backend Engineer"))).is_ok());
    }

    #[test]
    fn test_validate_rejects_oversized_target_role() {
        let text = "experience line ".repeat(20);
        let role = "r".repeat(101);
        assert!(validate(&request(&text, Some(&role))).is_err());
    }

    #[test]
    fn test_identical_inputs_share_a_cache_key() {
        let a = input_hash(&json!({"resume_text": "abc", "target_role": "x"}));
        let b = input_hash(&json!({"target_role": "x", "resume_text": "abc"}));
        assert_eq!(a, b);
    }

    const MODEL_BODY: &str =
        r#"{"score":72,"strengths":["x"],"weaknesses":["y"],"suggestions":["z"]}"#;

    #[tokio::test]
    async fn test_cache_hit_skips_the_model_but_not_the_quota() {
        let resume_text = "experience line ".repeat(20);
        let hash = input_hash(&json!({
            "resume_text": resume_text,
            "target_role": "Backend Engineer",
        }));

        let client = FixedClient::new(MODEL_BODY);
        let quota = FakeQuotaGate::allowing();
        let cache = MemoryCache::with(
            CacheKind::ResumeAnalysis,
            &hash,
            CachedResult {
                response: json!({"score": 80, "strengths": [], "weaknesses": [], "suggestions": []}),
                model: "test-model".to_string(),
                tokens_used: 12,
                created_at: Utc::now(),
            },
        );
        let state = state_with(
            client.clone(),
            cache.clone(),
            quota.clone(),
            FakeCreditGate::new(),
        );

        let req = request(&resume_text, Some("Backend Engineer"));
        let Json(response) = handle_analyze(State(state), Json(req)).await.unwrap();

        assert!(response.metadata.cached);
        assert_eq!(response.result["score"], json!(80));
        assert_eq!(client.call_count(), 0);
        // Admission was still charged before the lookup.
        assert_eq!(quota.check_count(), 1);
    }

    #[tokio::test]
    async fn test_quota_rejection_precedes_the_cache_lookup() {
        let resume_text = "experience line ".repeat(20);
        let hash = input_hash(&json!({
            "resume_text": resume_text,
            "target_role": "Backend Engineer",
        }));

        let client = FixedClient::new(MODEL_BODY);
        let quota = FakeQuotaGate::denying();
        let cache = MemoryCache::with(
            CacheKind::ResumeAnalysis,
            &hash,
            CachedResult {
                response: json!({"score": 80, "strengths": [], "weaknesses": [], "suggestions": []}),
                model: "test-model".to_string(),
                tokens_used: 12,
                created_at: Utc::now(),
            },
        );
        let state = state_with(
            client.clone(),
            cache.clone(),
            quota.clone(),
            FakeCreditGate::new(),
        );

        let err = handle_analyze(State(state), Json(request(&resume_text, Some("Backend Engineer"))))
            .await
            .unwrap_err();

        // A cached answer does not rescue an over-quota request.
        assert!(matches!(err, AppError::RateLimited(_)));
        assert_eq!(cache.get_count(), 0);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cache_miss_calls_the_model_and_stores_the_result() {
        let resume_text = "experience line ".repeat(20);

        let client = FixedClient::new(MODEL_BODY);
        let quota = FakeQuotaGate::allowing();
        let cache = MemoryCache::empty();
        let state = state_with(
            client.clone(),
            cache.clone(),
            quota.clone(),
            FakeCreditGate::new(),
        );

        let Json(response) =
            handle_analyze(State(state), Json(request(&resume_text, Some("Backend Engineer"))))
                .await
                .unwrap();

        assert!(!response.metadata.cached);
        assert_eq!(response.result["score"], json!(72));
        assert_eq!(response.metadata.tokens_used, 12);
        assert_eq!(client.call_count(), 1);
        assert_eq!(cache.get_count(), 1);
        assert_eq!(cache.len(), 1);
    }
}
