//! Durable per-user history of successful feature invocations.
//!
//! Written once per success, never mutated. A write failure is logged
//! and swallowed so it never masks a successful AI response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

use crate::cache::CacheKind;

/// Stored input prefix; long inputs are truncated for the record.
const INPUT_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HistoryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub input_preview: String,
    pub response: Value,
    pub model: String,
    pub tokens_used: i32,
    pub latency_ms: i64,
    pub created_at: DateTime<Utc>,
}

pub struct NewHistoryEntry<'a> {
    pub user_id: Uuid,
    pub kind: CacheKind,
    pub input: &'a str,
    pub response: &'a Value,
    pub model: &'a str,
    pub tokens_used: u32,
    pub latency_ms: u64,
}

/// Records one history entry. Fire-and-forget: failures are logged.
pub async fn save_history(pool: &PgPool, entry: NewHistoryEntry<'_>) {
    let result = sqlx::query(
        r#"
        INSERT INTO history_entries
            (id, user_id, kind, input_preview, response, model, tokens_used, latency_ms)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.user_id)
    .bind(entry.kind.as_str())
    .bind(truncate_preview(entry.input))
    .bind(entry.response)
    .bind(entry.model)
    .bind(entry.tokens_used as i32)
    .bind(entry.latency_ms as i64)
    .execute(pool)
    .await;

    if let Err(e) = result {
        warn!(user_id = %entry.user_id, kind = %entry.kind, error = %e, "history write failed");
    }
}

/// Most recent entries first.
pub async fn list_history(
    pool: &PgPool,
    user_id: Uuid,
    kind: CacheKind,
    limit: i64,
) -> Result<Vec<HistoryRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT * FROM history_entries
        WHERE user_id = $1 AND kind = $2
        ORDER BY created_at DESC
        LIMIT $3
        "#,
    )
    .bind(user_id)
    .bind(kind.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await
}

fn truncate_preview(input: &str) -> &str {
    match input.char_indices().nth(INPUT_PREVIEW_CHARS) {
        Some((byte_index, _)) => &input[..byte_index],
        None => input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_preview_keeps_short_input_whole() {
        assert_eq!(truncate_preview("short input"), "short input");
    }

    #[test]
    fn test_truncate_preview_cuts_at_char_boundary() {
        let long: String = "é".repeat(600);
        let preview = truncate_preview(&long);
        assert_eq!(preview.chars().count(), INPUT_PREVIEW_CHARS);
    }
}
