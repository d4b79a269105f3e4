mod config;
mod contract;
mod db;
mod errors;
mod generation;
mod llm_client;
mod models;
mod pipeline;
mod routes;
mod scoring;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::build_client;
use crate::llm_client::prompts::{PromptCatalog, PromptStore};
use crate::llm_client::registry::ProviderRegistry;
use crate::pipeline::store::{InMemoryRunStore, PgRunStore, RunStore};
use crate::pipeline::PipelineOrchestrator;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting PowerCV API v{}", env!("CARGO_PKG_VERSION"));

    // Provider registry: every profile is listed, only keyed ones are usable
    let registry = ProviderRegistry::from_configs(
        config.providers.clone(),
        config.llm_provider.as_deref(),
        build_client,
    )?;
    let providers = registry.list();
    let configured = providers.iter().filter(|p| p.configured).count();
    if configured == 0 {
        warn!("No LLM provider credentials found; runs will be rejected until one is configured");
    }
    info!(
        "LLM providers: {configured}/{} configured, active: {}",
        providers.len(),
        registry.active().unwrap_or_else(|| "none".to_string())
    );

    // System prompts
    let prompts: Arc<dyn PromptStore> = match &config.prompts_dir {
        Some(dir) => {
            info!("Loading prompts from {}", dir.display());
            Arc::new(PromptCatalog::from_dir(dir)?)
        }
        None => Arc::new(PromptCatalog::builtin()),
    };

    // Run store: Postgres when DATABASE_URL is set
    let store: Arc<dyn RunStore> = match &config.database_url {
        Some(url) => {
            let store = PgRunStore::new(create_pool(url).await?);
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            info!("DATABASE_URL not set; runs are kept in memory");
            Arc::new(InMemoryRunStore::new())
        }
    };

    let orchestrator = PipelineOrchestrator::new(Arc::new(registry), prompts, store);
    let state = AppState::new(orchestrator);

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
