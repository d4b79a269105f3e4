//! LLM Client — the uniform completion interface over every configured backend.
//!
//! ARCHITECTURAL RULE: No other module may call a provider API directly.
//! Stages talk to `dyn CompletionClient`; the registry decides which one.
//!
//! Two wire shapes are supported: OpenAI-compatible `/chat/completions`
//! (Cerebras, OpenAI, DeepSeek, Ollama) and the Anthropic Messages API.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, Response};
use thiserror::Error;
use tracing::debug;

use crate::config::{ProviderConfig, ProviderKind};
use crate::models::run::ErrorKind;

pub mod anthropic;
pub mod openai;
pub mod prompts;
pub mod registry;

/// Upstream bodies are quoted in errors for diagnostics, never in full.
const MAX_BODY_SNIPPET: usize = 200;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompletionError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("provider rejected credentials (status {0})")]
    AuthError(u16),

    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),
}

impl CompletionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompletionError::Timeout(_) => ErrorKind::Timeout,
            CompletionError::AuthError(_) => ErrorKind::AuthError,
            CompletionError::RateLimited { .. } => ErrorKind::RateLimited,
            CompletionError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            CompletionError::MalformedUpstreamResponse(_) => ErrorKind::MalformedUpstreamResponse,
        }
    }

    /// Worth another attempt against the same provider after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CompletionError::Timeout(_)
                | CompletionError::RateLimited { .. }
                | CompletionError::ProviderUnavailable(_)
        )
    }
}

/// A single backend able to turn a prompt pair into free text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Result<String, CompletionError>;
}

/// Builds the live client for a profile. `Ok(None)` means the profile is known
/// but its credential is absent, so it is listed as unconfigured.
pub fn build_client(config: &ProviderConfig) -> anyhow::Result<Option<Arc<dyn CompletionClient>>> {
    let api_key = match &config.credential_env {
        Some(var) => match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Some(key),
            _ => return Ok(None),
        },
        None => None,
    };

    let http = build_http_client(config.timeout_secs)
        .with_context(|| format!("Failed to build HTTP client for provider '{}'", config.name))?;

    let client: Arc<dyn CompletionClient> = match config.kind {
        ProviderKind::OpenAiCompatible => Arc::new(openai::OpenAiCompatibleClient::new(
            http,
            &config.endpoint,
            &config.model,
            api_key,
            config.timeout_secs,
        )),
        ProviderKind::Anthropic => {
            let api_key = api_key.with_context(|| {
                format!("Provider '{}' uses the Anthropic API and needs a credential", config.name)
            })?;
            Arc::new(anthropic::AnthropicClient::new(
                http,
                &config.endpoint,
                &config.model,
                api_key,
                config.timeout_secs,
            ))
        }
    };
    Ok(Some(client))
}

pub fn build_http_client(timeout_secs: u64) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

/// Maps a transport failure (no HTTP status) to the taxonomy.
pub(crate) fn classify_transport(err: &reqwest::Error, timeout_secs: u64) -> CompletionError {
    if err.is_timeout() {
        CompletionError::Timeout(timeout_secs)
    } else if err.is_decode() || err.is_body() {
        CompletionError::MalformedUpstreamResponse(err.to_string())
    } else {
        CompletionError::ProviderUnavailable(err.to_string())
    }
}

/// Maps a non-success HTTP status to the taxonomy.
pub(crate) fn classify_status(status: u16, retry_after: Option<u64>, body: &str) -> CompletionError {
    match status {
        401 | 403 => CompletionError::AuthError(status),
        429 => CompletionError::RateLimited { retry_after },
        500..=599 => CompletionError::ProviderUnavailable(format!(
            "status {status}: {}",
            snippet(body)
        )),
        _ => CompletionError::MalformedUpstreamResponse(format!(
            "status {status}: {}",
            snippet(body)
        )),
    }
}

/// Passes successful responses through and classifies everything else.
pub(crate) async fn check_status(response: Response) -> Result<Response, CompletionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), "provider returned non-success status");
    Err(classify_status(status.as_u16(), retry_after, &body))
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(MAX_BODY_SNIPPET) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
