//! Tutoring chat — the one credit-gated, plain-text call path.
//! Conversations are durable; prior turns are replayed as context.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ai::orchestrator::GenerateOptions;
use crate::ai::template::render;
use crate::errors::AppError;
use crate::features::prompts::{TUTOR_PROMPT, TUTOR_SYSTEM};
use crate::features::{ResponseMetadata, UserIdQuery};
use crate::models::chat::{ChatMessageRow, ConversationRow};
use crate::quota::credits::CreditOutcome;
use crate::state::AppState;

/// How many prior turns are replayed into the prompt.
const CONTEXT_MESSAGES: i64 = 20;
const TITLE_CHARS: usize = 60;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: Uuid,
    /// Absent on the first message; a new conversation is created.
    pub conversation_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub conversation_id: Uuid,
    pub reply: String,
    pub credits_remaining: i32,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation: ConversationRow,
    pub messages: Vec<ChatMessageRow>,
}

fn render_context(messages: &[ChatMessageRow]) -> String {
    if messages.is_empty() {
        return "(start of conversation)".to_string();
    }
    messages
        .iter()
        .map(|m| {
            let speaker = if m.role == "assistant" { "Tutor" } else { "Student" };
            format!("{speaker}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn conversation_title(first_message: &str) -> String {
    match first_message.char_indices().nth(TITLE_CHARS) {
        Some((byte_index, _)) => format!("{}…", &first_message[..byte_index]),
        None => first_message.to_string(),
    }
}

/// POST /api/v1/chat/message
pub async fn handle_message(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    crate::features::require_len("message", &req.message, 1, 2000)?;

    // Resolve ownership before spending a credit, so a missing or
    // foreign conversation_id is rejected for free. A foreign
    // conversation is indistinguishable from a missing one.
    if let Some(id) = req.conversation_id {
        let owned: Option<ConversationRow> =
            sqlx::query_as("SELECT * FROM chat_conversations WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(req.user_id)
                .fetch_optional(&state.db)
                .await?;
        if owned.is_none() {
            return Err(AppError::NotFound(format!("Conversation {id} not found")));
        }
    }

    let credits = match state.credits.check_and_deduct(req.user_id).await {
        CreditOutcome::Allowed { remaining } => remaining,
        CreditOutcome::Denied => {
            return Err(AppError::RateLimited(
                "Daily credit limit reached. Credits reset at midnight UTC.".to_string(),
            ))
        }
    };

    let conversation_id = match req.conversation_id {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4();
            sqlx::query("INSERT INTO chat_conversations (id, user_id, title) VALUES ($1, $2, $3)")
                .bind(id)
                .bind(req.user_id)
                .bind(conversation_title(&req.message))
                .execute(&state.db)
                .await?;
            id
        }
    };

    let context: Vec<ChatMessageRow> = sqlx::query_as(
        r#"
        SELECT * FROM (
            SELECT * FROM chat_messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC
            LIMIT $2
        ) recent ORDER BY created_at
        "#,
    )
    .bind(conversation_id)
    .bind(CONTEXT_MESSAGES)
    .fetch_all(&state.db)
    .await?;

    let conversation_text = render_context(&context);
    let prompt = render(
        TUTOR_PROMPT,
        &HashMap::from([
            ("conversation", conversation_text.as_str()),
            ("message", req.message.as_str()),
        ]),
    );

    let mut opts = GenerateOptions::new("chat");
    opts.system_instruction = Some(TUTOR_SYSTEM);
    opts.user_id = Some(req.user_id);

    let generated = state.orchestrator.generate_text(&prompt, &opts).await?;

    // Persist both turns; the assistant message second so replay order
    // matches submission order.
    sqlx::query(
        "INSERT INTO chat_messages (id, conversation_id, role, content) VALUES ($1, $2, 'user', $3)",
    )
    .bind(Uuid::new_v4())
    .bind(conversation_id)
    .bind(&req.message)
    .execute(&state.db)
    .await?;

    sqlx::query(
        "INSERT INTO chat_messages (id, conversation_id, role, content) VALUES ($1, $2, 'assistant', $3)",
    )
    .bind(Uuid::new_v4())
    .bind(conversation_id)
    .bind(&generated.result)
    .execute(&state.db)
    .await?;

    Ok(Json(ChatResponse {
        conversation_id,
        reply: generated.result,
        credits_remaining: credits,
        metadata: ResponseMetadata {
            model: generated.metadata.model,
            cached: false,
            tokens_used: generated.usage.total_tokens,
            latency_ms: generated.metadata.latency_ms,
            retry_count: generated.metadata.retry_count,
        },
    }))
}

/// GET /api/v1/chat/:conversation_id
pub async fn handle_get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<ConversationResponse>, AppError> {
    let conversation: Option<ConversationRow> =
        sqlx::query_as("SELECT * FROM chat_conversations WHERE id = $1 AND user_id = $2")
            .bind(conversation_id)
            .bind(params.user_id)
            .fetch_optional(&state.db)
            .await?;
    let conversation = conversation.ok_or_else(|| {
        AppError::NotFound(format!("Conversation {conversation_id} not found"))
    })?;

    let messages: Vec<ChatMessageRow> = sqlx::query_as(
        "SELECT * FROM chat_messages WHERE conversation_id = $1 ORDER BY created_at",
    )
    .bind(conversation_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ConversationResponse {
        conversation,
        messages,
    }))
}
