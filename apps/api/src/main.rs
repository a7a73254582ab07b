mod ai;
mod cache;
mod config;
mod db;
mod errors;
mod features;
mod history;
mod llm_client;
mod models;
mod quota;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::ai::orchestrator::Orchestrator;
use crate::cache::RedisCache;
use crate::config::Config;
use crate::db::{create_pool, init_schema};
use crate::llm_client::GeminiClient;
use crate::quota::credits::PgCreditGate;
use crate::quota::rate_limiter::PgQuotaGate;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let crate_target = env!("CARGO_PKG_NAME").replace('-', "_");
            EnvFilter::new(format!("{}={}", crate_target, &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Campus Companion API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    init_schema(&db).await?;

    // Initialize Redis (response cache)
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    // Initialize the model client and orchestrator
    let model_client = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        config.model_name.clone(),
    ));
    let orchestrator = Orchestrator::new(model_client);
    info!("LLM orchestrator initialized (model: {})", config.model_name);

    // Build app state
    let state = AppState {
        db: db.clone(),
        cache: Arc::new(RedisCache::new(redis)),
        quota: Arc::new(PgQuotaGate::new(db.clone())),
        credits: Arc::new(PgCreditGate::new(db)),
        orchestrator,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
