use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

const CREATE_USAGE_RECORDS: &str = r#"
CREATE TABLE IF NOT EXISTS usage_records (
    user_id UUID PRIMARY KEY,
    date DATE NOT NULL,
    daily_count INTEGER NOT NULL DEFAULT 0,
    hourly_count INTEGER NOT NULL DEFAULT 0,
    last_hour_reset TIMESTAMPTZ NOT NULL,
    minute_count INTEGER NOT NULL DEFAULT 0,
    last_minute_reset TIMESTAMPTZ NOT NULL,
    total_calls BIGINT NOT NULL DEFAULT 0,
    last_call_at TIMESTAMPTZ
)
"#;

const CREATE_USER_PROFILES: &str = r#"
CREATE TABLE IF NOT EXISTS user_profiles (
    user_id UUID PRIMARY KEY,
    credits INTEGER NOT NULL DEFAULT 30,
    last_credit_reset TIMESTAMPTZ
)
"#;

const CREATE_HISTORY_ENTRIES: &str = r#"
CREATE TABLE IF NOT EXISTS history_entries (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL,
    kind TEXT NOT NULL,
    input_preview TEXT NOT NULL,
    response JSONB NOT NULL,
    model TEXT NOT NULL,
    tokens_used INTEGER NOT NULL DEFAULT 0,
    latency_ms BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_HISTORY_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_history_user_kind
    ON history_entries (user_id, kind, created_at DESC)
"#;

const CREATE_INTERVIEW_SESSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS interview_sessions (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL,
    role TEXT NOT NULL,
    interview_type TEXT NOT NULL,
    difficulty TEXT NOT NULL,
    questions JSONB NOT NULL,
    current_question_index INTEGER NOT NULL DEFAULT 0,
    exchanges JSONB NOT NULL DEFAULT '[]'::jsonb,
    evaluation JSONB,
    completed_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_CHAT_CONVERSATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS chat_conversations (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL,
    title TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_CHAT_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS chat_messages (
    id UUID PRIMARY KEY,
    conversation_id UUID NOT NULL REFERENCES chat_conversations(id),
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_CHAT_MESSAGES_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_chat_messages_conversation
    ON chat_messages (conversation_id, created_at)
"#;

/// Creates all tables and indexes if they do not exist yet.
/// Runs once at startup, before the server starts accepting requests.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    for statement in [
        CREATE_USAGE_RECORDS,
        CREATE_USER_PROFILES,
        CREATE_HISTORY_ENTRIES,
        CREATE_HISTORY_INDEX,
        CREATE_INTERVIEW_SESSIONS,
        CREATE_CHAT_CONVERSATIONS,
        CREATE_CHAT_MESSAGES,
        CREATE_CHAT_MESSAGES_INDEX,
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("Database schema ready");
    Ok(())
}
