use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::registry::RegistryError;
use crate::pipeline::PipelineError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("No LLM providers configured")]
    NoProvidersConfigured,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotConfigured(name) => AppError::ProviderNotConfigured(name),
            RegistryError::NoProvidersConfigured => AppError::NoProvidersConfigured,
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::EmptyInput(_) => AppError::Validation(err.to_string()),
            PipelineError::Registry(e) => e.into(),
            PipelineError::Store(e) => AppError::Internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::ProviderNotConfigured(name) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "PROVIDER_NOT_CONFIGURED",
                format!("Provider '{name}' is not configured"),
            ),
            AppError::NoProvidersConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NO_PROVIDERS_CONFIGURED",
                "No LLM providers are configured".to_string(),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_errors_map_to_client_statuses() {
        let resp = AppError::from(RegistryError::NotConfigured("openai".into())).into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let resp = AppError::from(RegistryError::NoProvidersConfigured).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_store_errors_are_not_echoed() {
        let err = AppError::from(PipelineError::Store(anyhow::anyhow!("password=hunter2")));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_empty_input_is_a_validation_error() {
        let err = AppError::from(PipelineError::EmptyInput("cv"));
        assert!(matches!(err, AppError::Validation(ref m) if m == "cv must not be empty"));
    }
}
