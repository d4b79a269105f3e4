use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::run::{PipelineRun, RunState, Stage};
use crate::pipeline::RunRequest;
use crate::state::AppState;

#[derive(Serialize)]
pub struct RunCreated {
    pub run_id: Uuid,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub run_id: Uuid,
    pub cancel_requested: bool,
    pub state: RunState,
}

async fn load_run(state: &AppState, id: Uuid) -> Result<PipelineRun, AppError> {
    state
        .runs()
        .load(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Run {id} not found")))
}

/// POST /api/v1/runs
pub async fn handle_create_run(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<(StatusCode, Json<RunCreated>), AppError> {
    let run_id = state.orchestrator.start(req).await?;
    Ok((StatusCode::ACCEPTED, Json(RunCreated { run_id })))
}

/// GET /api/v1/runs/:id
pub async fn handle_get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineRun>, AppError> {
    Ok(Json(load_run(&state, id).await?))
}

/// GET /api/v1/runs/:id/artifacts/:stage
/// Artifacts of finished stages are served even if a later stage failed.
pub async fn handle_get_artifact(
    State(state): State<AppState>,
    Path((id, stage)): Path<(Uuid, String)>,
) -> Result<Json<Value>, AppError> {
    let stage = Stage::parse(&stage)
        .ok_or_else(|| AppError::Validation(format!("Unknown stage '{stage}'")))?;
    let run = load_run(&state, id).await?;

    let artifacts = &run.artifacts;
    let artifact = match stage {
        Stage::Analyze => artifacts.analysis.as_ref().map(serde_json::to_value),
        Stage::Optimize => artifacts.optimized_resume.as_ref().map(serde_json::to_value),
        Stage::CoverLetter => artifacts.cover_letter.as_ref().map(serde_json::to_value),
    };

    match artifact {
        Some(value) => Ok(Json(value.map_err(anyhow::Error::from)?)),
        None => Err(AppError::NotFound(format!(
            "Run {id} has no '{stage}' artifact"
        ))),
    }
}

/// POST /api/v1/runs/:id/cancel
pub async fn handle_cancel_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, AppError> {
    let cancel_requested = state.orchestrator.cancel(id);
    let run = load_run(&state, id).await?;
    Ok(Json(CancelResponse {
        run_id: id,
        cancel_requested,
        state: run.state,
    }))
}
