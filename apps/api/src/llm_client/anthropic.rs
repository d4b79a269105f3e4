use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm_client::{check_status, classify_transport, CompletionClient, CompletionError};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicResponse {
    /// Text of the first text block.
    fn text(self) -> Option<String> {
        self.content
            .into_iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text)
    }
}

/// Client for the Anthropic Messages API.
#[derive(Clone)]
pub struct AnthropicClient {
    http: Client,
    url: String,
    model: String,
    api_key: String,
    timeout_secs: u64,
}

impl AnthropicClient {
    pub fn new(http: Client, endpoint: &str, model: &str, api_key: String, timeout_secs: u64) -> Self {
        Self {
            http,
            url: format!("{}/v1/messages", endpoint.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
            timeout_secs,
        }
    }
}

impl fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Result<String, CompletionError> {
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: max_output_tokens,
            temperature,
            system: system_prompt,
            messages: vec![AnthropicMessage {
                role: "user",
                content: user_message,
            }],
        };

        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e, self.timeout_secs))?;
        let response = check_status(response).await?;

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::MalformedUpstreamResponse(e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                model = %self.model,
                "completion succeeded: input_tokens={}, output_tokens={}",
                usage.input_tokens, usage.output_tokens
            );
        }

        parsed
            .text()
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| CompletionError::MalformedUpstreamResponse("no text block".to_string()))
    }
}
