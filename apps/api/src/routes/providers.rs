use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::llm_client::registry::ProviderStatus;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SwitchProvider {
    pub name: String,
}

#[derive(Serialize)]
pub struct HealthResult {
    pub name: String,
    pub healthy: bool,
}

/// GET /api/v1/providers
pub async fn handle_list_providers(State(state): State<AppState>) -> Json<Vec<ProviderStatus>> {
    Json(state.registry().list())
}

/// PUT /api/v1/providers/active
/// Affects runs started afterwards only.
pub async fn handle_switch_provider(
    State(state): State<AppState>,
    Json(req): Json<SwitchProvider>,
) -> Result<Json<Vec<ProviderStatus>>, AppError> {
    state.registry().switch(&req.name)?;
    Ok(Json(state.registry().list()))
}

/// POST /api/v1/providers/:name/health
pub async fn handle_health_check(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<HealthResult>, AppError> {
    let healthy = state.registry().health_check(&name).await?;
    Ok(Json(HealthResult { name, healthy }))
}
