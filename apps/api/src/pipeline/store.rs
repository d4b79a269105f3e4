//! Run persistence. A run is saved whole after every state change, so artifacts
//! of finished stages are readable while later stages are still running.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::models::run::PipelineRun;

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn save(&self, run: &PipelineRun) -> Result<()>;
    async fn load(&self, id: Uuid) -> Result<Option<PipelineRun>>;
}

#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<Uuid, PipelineRun>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, run: &PipelineRun) -> Result<()> {
        self.runs.write().await.insert(run.id, run.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<PipelineRun>> {
        Ok(self.runs.read().await.get(&id).cloned())
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    document: Json<PipelineRun>,
}

/// Postgres store: one row per run, the full run as a JSONB document.
#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pipeline_runs (
                id          UUID PRIMARY KEY,
                state       TEXT NOT NULL,
                document    JSONB NOT NULL,
                created_at  TIMESTAMPTZ NOT NULL,
                updated_at  TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        info!("pipeline_runs table ready");
        Ok(())
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn save(&self, run: &PipelineRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (id, state, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET state = EXCLUDED.state,
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(run.id)
        .bind(run.state.to_string())
        .bind(Json(run))
        .bind(run.created_at)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<PipelineRun>> {
        let row: Option<RunRow> =
            sqlx::query_as("SELECT document FROM pipeline_runs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.document.0))
    }
}
