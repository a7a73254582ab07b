use std::sync::Arc;

use sqlx::PgPool;

use crate::ai::orchestrator::Orchestrator;
use crate::cache::ResponseCache;
use crate::quota::credits::CreditGate;
use crate::quota::rate_limiter::QuotaGate;

/// Shared application state injected into all route handlers via Axum
/// extractors. Built once at startup; every handle here is safe to
/// clone and share. The cache and quota gates sit behind traits so
/// handler tests can run the full pipeline without Redis or Postgres.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Response cache, keyed by (kind, input hash) with per-kind TTLs.
    pub cache: Arc<dyn ResponseCache>,
    /// Multi-window limiter gating the generation endpoints.
    pub quota: Arc<dyn QuotaGate>,
    /// Daily credit ledger gating the tutoring chat.
    pub credits: Arc<dyn CreditGate>,
    pub orchestrator: Orchestrator,
}
