use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm_client::{check_status, classify_transport, CompletionClient, CompletionError};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Client for any `/chat/completions` endpoint. Local servers (Ollama) run without a key.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    http: Client,
    url: String,
    model: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl OpenAiCompatibleClient {
    pub fn new(
        http: Client,
        endpoint: &str,
        model: &str,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            http,
            url: format!("{}/chat/completions", endpoint.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
            timeout_secs,
        }
    }
}

impl fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Result<String, CompletionError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            temperature,
            max_tokens: max_output_tokens,
            stream: false,
        };

        let mut request = self.http.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_transport(&e, self.timeout_secs))?;
        let response = check_status(response).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::MalformedUpstreamResponse(e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                model = %self.model,
                "completion succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| CompletionError::MalformedUpstreamResponse("empty content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};

    use crate::llm_client::build_http_client;
    use crate::models::run::ErrorKind;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn client(endpoint: &str, key: Option<&str>) -> OpenAiCompatibleClient {
        OpenAiCompatibleClient::new(
            build_http_client(5).unwrap(),
            endpoint,
            "gpt-oss-120b",
            key.map(String::from),
            5,
        )
    }

    #[tokio::test]
    async fn test_complete_sends_chat_payload_and_returns_content() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer sk-test");
                assert_eq!(body["model"], "gpt-oss-120b");
                assert_eq!(body["messages"][0]["role"], "system");
                assert_eq!(body["messages"][1]["content"], "hello");
                assert_eq!(body["max_tokens"], 64);
                assert_eq!(body["stream"], false);
                Json(json!({
                    "choices": [{"message": {"role": "assistant", "content": "{\"ok\": true}"}}],
                    "usage": {"prompt_tokens": 10, "completion_tokens": 4}
                }))
            }),
        );
        let endpoint = serve(router).await;

        let text = client(&endpoint, Some("sk-test"))
            .complete("system", "hello", 0.5, 64)
            .await
            .unwrap();
        assert_eq!(text, "{\"ok\": true}");
    }

    #[tokio::test]
    async fn test_status_codes_map_to_taxonomy() {
        let router = Router::new()
            .route("/auth/chat/completions", post(|| async { StatusCode::UNAUTHORIZED }))
            .route(
                "/limit/chat/completions",
                post(|| async {
                    (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "3")], "slow down")
                        .into_response()
                }),
            )
            .route(
                "/down/chat/completions",
                post(|| async { StatusCode::BAD_GATEWAY }),
            );
        let base = serve(router).await;
        let base = base.trim_end_matches("/v1");

        let err = client(&format!("{base}/auth"), Some("k"))
            .complete("s", "u", 0.0, 1)
            .await
            .unwrap_err();
        assert_eq!(err, CompletionError::AuthError(401));

        let err = client(&format!("{base}/limit"), Some("k"))
            .complete("s", "u", 0.0, 1)
            .await
            .unwrap_err();
        assert_eq!(err, CompletionError::RateLimited { retry_after: Some(3) });

        let err = client(&format!("{base}/down"), Some("k"))
            .complete("s", "u", 0.0, 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
    }

    #[tokio::test]
    async fn test_empty_or_garbled_body_is_malformed() {
        let router = Router::new()
            .route(
                "/empty/chat/completions",
                post(|| async { Json(json!({"choices": [{"message": {"content": "  "}}]})) }),
            )
            .route("/garbled/chat/completions", post(|| async { "not json" }));
        let base = serve(router).await;
        let base = base.trim_end_matches("/v1");

        for path in ["empty", "garbled"] {
            let err = client(&format!("{base}/{path}"), None)
                .complete("s", "u", 0.0, 1)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedUpstreamResponse, "{path}");
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let err = client("http://127.0.0.1:1", None)
            .complete("s", "u", 0.0, 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
    }

    #[test]
    fn test_debug_never_shows_key() {
        let c = client("http://localhost:11434/v1", Some("sk-very-secret"));
        let debug = format!("{c:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
