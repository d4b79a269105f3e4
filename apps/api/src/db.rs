use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Runs write one small row per state change; a handful of connections is plenty.
const MAX_CONNECTIONS: u32 = 5;

/// Creates the PostgreSQL pool backing the run store.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL run store...");

    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .context("Failed to connect to DATABASE_URL")?;

    info!("PostgreSQL pool established ({MAX_CONNECTIONS} connections max)");
    Ok(pool)
}
