//! Mock interview — question generation, atomic answer submission, and
//! a terminal evaluation computed exactly once.
//!
//! Concurrency rule: "read session, append one exchange, advance the
//! index" is a single transaction holding a row lock, so two racing
//! `submit answer` calls cannot duplicate or skip a question index.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::types::Json as SqlJson;
use uuid::Uuid;

use crate::ai::hash::input_hash;
use crate::ai::orchestrator::{Generated, GenerateOptions};
use crate::ai::template::render;
use crate::cache::{CacheKind, CachedResult};
use crate::errors::AppError;
use crate::features::prompts::{
    INTERVIEW_EVALUATION_PROMPT, INTERVIEW_FEEDBACK_PROMPT, INTERVIEW_QUESTIONS_PROMPT,
    INTERVIEW_SYSTEM,
};
use crate::features::{tier_for, ResponseMetadata, UserIdQuery};
use crate::models::interview::{Exchange, InterviewSessionRow};
use crate::state::AppState;

const DEFAULT_QUESTIONS: u32 = 5;
const MAX_QUESTIONS: u32 = 10;
const INTERVIEW_TYPES: [&str; 3] = ["behavioral", "technical", "mixed"];
const DIFFICULTIES: [&str; 3] = ["easy", "medium", "hard"];

// ────────────────────────────────────────────────────────────────────────────
// Request / response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub user_id: Uuid,
    pub role: String,
    pub interview_type: String,
    pub difficulty: String,
    pub num_questions: Option<u32>,
    #[serde(default)]
    pub premium: bool,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub session_id: Uuid,
    pub questions: Vec<String>,
    pub current_question_index: i32,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub user_id: Uuid,
    pub answer: String,
    #[serde(default)]
    pub premium: bool,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub session_id: Uuid,
    /// Index of the question just answered.
    pub question_index: i32,
    pub feedback: Value,
    pub completed: bool,
    pub next_question: Option<String>,
    pub evaluation: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeneratedQuestions {
    questions: Vec<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Validation and pure helpers
// ────────────────────────────────────────────────────────────────────────────

fn validate_start(req: &StartRequest) -> Result<u32, AppError> {
    crate::features::require_len("role", &req.role, 2, 100)?;
    if !INTERVIEW_TYPES.contains(&req.interview_type.as_str()) {
        return Err(AppError::Validation(format!(
            "interview_type must be one of: {}",
            INTERVIEW_TYPES.join(", ")
        )));
    }
    if !DIFFICULTIES.contains(&req.difficulty.as_str()) {
        return Err(AppError::Validation(format!(
            "difficulty must be one of: {}",
            DIFFICULTIES.join(", ")
        )));
    }
    let count = req.num_questions.unwrap_or(DEFAULT_QUESTIONS);
    if count == 0 || count > MAX_QUESTIONS {
        return Err(AppError::Validation(format!(
            "num_questions must be between 1 and {MAX_QUESTIONS}"
        )));
    }
    Ok(count)
}

fn render_transcript(exchanges: &[Exchange]) -> String {
    let mut out = String::new();
    for (i, exchange) in exchanges.iter().enumerate() {
        out.push_str(&format!(
            "Q{n}: {q}\nAnswer: {a}\nFeedback: {f}\n\n",
            n = i + 1,
            q = exchange.question,
            a = exchange.answer,
            f = exchange.feedback,
        ));
    }
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/interview/start
pub async fn handle_start(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartResponse>, AppError> {
    let count = validate_start(&req)?;
    state
        .quota
        .check(req.user_id, "interview_start", tier_for(req.premium))
        .await?;

    let hash = input_hash(&json!({
        "role": req.role,
        "interview_type": req.interview_type,
        "difficulty": req.difficulty,
        "count": count,
    }));

    // Question sets are cacheable across sessions; each start still
    // creates its own session row.
    let (questions, metadata) =
        match state.cache.get(CacheKind::InterviewQuestions, &hash).await {
            Some(hit) => {
                tracing::info!(
                    feature = "interview_start",
                    user_id = %req.user_id,
                    input_hash = %hash,
                    "cache_hit"
                );
                let parsed: GeneratedQuestions = serde_json::from_value(hit.response)
                    .map_err(|e| AppError::Llm(format!("cached questions undecodable: {e}")))?;
                (
                    parsed.questions,
                    ResponseMetadata {
                        model: hit.model,
                        cached: true,
                        tokens_used: hit.tokens_used,
                        latency_ms: 0,
                        retry_count: 0,
                    },
                )
            }
            None => {
                let count_str = count.to_string();
                let prompt = render(
                    INTERVIEW_QUESTIONS_PROMPT,
                    &HashMap::from([
                        ("role", req.role.as_str()),
                        ("interview_type", req.interview_type.as_str()),
                        ("difficulty", req.difficulty.as_str()),
                        ("count", count_str.as_str()),
                    ]),
                );

                let mut opts = GenerateOptions::new("interview_start");
                opts.system_instruction = Some(INTERVIEW_SYSTEM);
                opts.required_fields = &["questions"];
                opts.user_id = Some(req.user_id);
                opts.input_hash = &hash;

                let generated: Generated<GeneratedQuestions> =
                    state.orchestrator.generate(&prompt, &opts).await?;

                if generated.result.questions.is_empty() {
                    return Err(AppError::Llm("model returned no questions".to_string()));
                }

                state
                    .cache
                    .put(
                        CacheKind::InterviewQuestions,
                        &hash,
                        &CachedResult {
                            response: serde_json::to_value(&generated.result)
                                .map_err(|e| AppError::Llm(e.to_string()))?,
                            model: generated.metadata.model.clone(),
                            tokens_used: generated.usage.total_tokens,
                            created_at: Utc::now(),
                        },
                    )
                    .await;

                (
                    generated.result.questions,
                    ResponseMetadata {
                        model: generated.metadata.model,
                        cached: false,
                        tokens_used: generated.usage.total_tokens,
                        latency_ms: generated.metadata.latency_ms,
                        retry_count: generated.metadata.retry_count,
                    },
                )
            }
        };

    let session_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO interview_sessions
            (id, user_id, role, interview_type, difficulty, questions)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(session_id)
    .bind(req.user_id)
    .bind(&req.role)
    .bind(&req.interview_type)
    .bind(&req.difficulty)
    .bind(SqlJson(&questions))
    .execute(&state.db)
    .await?;

    Ok(Json(StartResponse {
        session_id,
        questions,
        current_question_index: 0,
        metadata,
    }))
}

/// POST /api/v1/interview/:id/answer
pub async fn handle_answer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    crate::features::require_len("answer", &req.answer, 1, 5000)?;
    state
        .quota
        .check(req.user_id, "interview_answer", tier_for(req.premium))
        .await?;

    // Unlocked pre-read: resolve the current question for the AI
    // feedback call without holding the row lock across it.
    let session = load_session(&state.db, session_id, req.user_id).await?;
    if session.is_complete() {
        return Err(AppError::Validation(
            "interview session is already complete".to_string(),
        ));
    }
    let expected_index = session.current_question_index;
    let question = session
        .current_question()
        .ok_or_else(|| AppError::Llm("session has no current question".to_string()))?
        .to_string();

    let prompt = render(
        INTERVIEW_FEEDBACK_PROMPT,
        &HashMap::from([
            ("question", question.as_str()),
            ("answer", req.answer.as_str()),
        ]),
    );

    let mut opts = GenerateOptions::new("interview_answer");
    opts.system_instruction = Some(INTERVIEW_SYSTEM);
    opts.required_fields = &["score", "feedback"];
    opts.user_id = Some(req.user_id);

    let generated: Generated<Value> = state.orchestrator.generate(&prompt, &opts).await?;
    let feedback = generated.result;

    // Atomic append + advance under a row lock.
    let mut tx = state.db.begin().await?;
    let mut locked: InterviewSessionRow =
        sqlx::query_as("SELECT * FROM interview_sessions WHERE id = $1 FOR UPDATE")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Interview session {session_id} not found")))?;

    if locked.current_question_index != expected_index {
        return Err(AppError::Validation(
            "this question was already answered by a concurrent request".to_string(),
        ));
    }

    let now = Utc::now();
    locked
        .record_exchange(
            Exchange {
                question,
                answer: req.answer.clone(),
                feedback: feedback.clone(),
            },
            now,
        )
        .map_err(|e| AppError::Validation(e.to_string()))?;

    sqlx::query(
        r#"
        UPDATE interview_sessions
        SET exchanges = $1, current_question_index = $2, completed_at = $3
        WHERE id = $4
        "#,
    )
    .bind(SqlJson(&locked.exchanges.0))
    .bind(locked.current_question_index)
    .bind(locked.completed_at)
    .bind(session_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let completed = locked.is_complete();
    let evaluation = if completed {
        Some(evaluate_session(&state, &locked).await?)
    } else {
        None
    };

    Ok(Json(AnswerResponse {
        session_id,
        question_index: expected_index,
        feedback,
        completed,
        next_question: locked.current_question().map(String::from),
        evaluation,
    }))
}

/// GET /api/v1/interview/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<InterviewSessionRow>, AppError> {
    let mut session = load_session(&state.db, session_id, params.user_id).await?;

    // A failed evaluation call after the final answer committed leaves
    // the session complete but unevaluated; retry it here. The guarded
    // UPDATE in `evaluate_session` keeps the stored result exactly-once.
    if needs_evaluation(&session) {
        match evaluate_session(&state, &session).await {
            Ok(evaluation) => session.evaluation = Some(evaluation),
            Err(e) => tracing::warn!(
                %session_id,
                error = %e,
                "deferred evaluation failed, returning session without it"
            ),
        }
    }

    Ok(Json(session))
}

fn needs_evaluation(session: &InterviewSessionRow) -> bool {
    session.is_complete() && session.evaluation.is_none()
}

async fn load_session(
    pool: &sqlx::PgPool,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<InterviewSessionRow, AppError> {
    let session: Option<InterviewSessionRow> =
        sqlx::query_as("SELECT * FROM interview_sessions WHERE id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    session.ok_or_else(|| AppError::NotFound(format!("Interview session {session_id} not found")))
}

/// Computes the terminal evaluation. Reached by the caller that
/// performed the final index advance, or by a later session read when
/// that caller's attempt failed; the guarded UPDATE makes a duplicate
/// attempt a no-op.
async fn evaluate_session(
    state: &AppState,
    session: &InterviewSessionRow,
) -> Result<Value, AppError> {
    let transcript = render_transcript(&session.exchanges.0);
    let prompt = render(
        INTERVIEW_EVALUATION_PROMPT,
        &HashMap::from([
            ("role", session.role.as_str()),
            ("interview_type", session.interview_type.as_str()),
            ("difficulty", session.difficulty.as_str()),
            ("transcript", transcript.as_str()),
        ]),
    );

    let mut opts = GenerateOptions::new("interview_evaluation");
    opts.system_instruction = Some(INTERVIEW_SYSTEM);
    opts.required_fields = &["overall_score", "summary"];
    opts.user_id = Some(session.user_id);

    let generated: Generated<Value> = state.orchestrator.generate(&prompt, &opts).await?;

    let updated = sqlx::query(
        "UPDATE interview_sessions SET evaluation = $1 WHERE id = $2 AND evaluation IS NULL",
    )
    .bind(&generated.result)
    .bind(session.id)
    .execute(&state.db)
    .await?;

    if updated.rows_affected() == 0 {
        // Another request already stored an evaluation; return it.
        let existing: Option<(Option<Value>,)> =
            sqlx::query_as("SELECT evaluation FROM interview_sessions WHERE id = $1")
                .bind(session.id)
                .fetch_optional(&state.db)
                .await?;
        if let Some((Some(evaluation),)) = existing {
            return Ok(evaluation);
        }
    }

    Ok(generated.result)
}
