pub mod health;
pub mod providers;
pub mod runs;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Pipeline runs
        .route("/api/v1/runs", post(runs::handle_create_run))
        .route("/api/v1/runs/:id", get(runs::handle_get_run))
        .route(
            "/api/v1/runs/:id/artifacts/:stage",
            get(runs::handle_get_artifact),
        )
        .route("/api/v1/runs/:id/cancel", post(runs::handle_cancel_run))
        // Provider registry
        .route("/api/v1/providers", get(providers::handle_list_providers))
        .route(
            "/api/v1/providers/active",
            put(providers::handle_switch_provider),
        )
        .route(
            "/api/v1/providers/:name/health",
            post(providers::handle_health_check),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::{ProviderConfig, ProviderKind};
    use crate::llm_client::prompts::PromptCatalog;
    use crate::llm_client::registry::ProviderRegistry;
    use crate::llm_client::testing::ScriptedClient;
    use crate::llm_client::CompletionError;
    use crate::pipeline::store::InMemoryRunStore;
    use crate::pipeline::PipelineOrchestrator;

    const JD: &str = "Platform Engineer. Rust and Kubernetes required.";
    const CV: &str = "Sam Lee\nPlatform Engineer, Initech, 2019 - 2024\nRust tooling.";

    fn profile(name: &str, priority: u32) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            kind: ProviderKind::OpenAiCompatible,
            model: "test-model".to_string(),
            endpoint: "http://unused".to_string(),
            credential_env: None,
            priority,
            timeout_secs: 5,
        }
    }

    fn analysis() -> String {
        json!({
            "ats_score": 55,
            "keyword_analysis": {
                "matched_keywords": [{"keyword": "Rust", "jd_mentions": 1, "cv_mentions": 1}],
                "missing_critical": ["Kubernetes"]
            },
            "experience_analysis": {
                "relevant_roles": [{"title": "Platform Engineer", "relevance": "HIGHLY_RELEVANT"}]
            }
        })
        .to_string()
    }

    fn resume() -> String {
        json!({
            "user_information": {
                "name": "Sam Lee",
                "main_job_title": "Platform Engineer",
                "profile_description": "Builds Rust tooling.",
                "experiences": [{
                    "job_title": "Platform Engineer",
                    "company": "Initech",
                    "start_date": "2019",
                    "end_date": "2024"
                }],
                "education": [],
                "skills": {"hard_skills": ["Rust"], "soft_skills": []}
            }
        })
        .to_string()
    }

    fn app(primary: Arc<ScriptedClient>) -> Router {
        let registry = Arc::new(ProviderRegistry::new());
        registry.register(profile("primary", 10), Some(primary));
        registry.register(
            profile("backup", 20),
            Some(ScriptedClient::failing(CompletionError::AuthError(401))),
        );
        registry.register(profile("unkeyed", 30), None);
        registry.switch("primary").unwrap();

        let orchestrator = PipelineOrchestrator::new(
            registry,
            Arc::new(PromptCatalog::builtin()),
            Arc::new(InMemoryRunStore::new()),
        );
        build_router(AppState::new(orchestrator))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(ScriptedClient::always("{}"));
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "powercv-api");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_lifecycle_over_http() {
        let app = app(ScriptedClient::new(vec![Ok(analysis()), Ok(resume())]));

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/runs",
            Some(json!({"job_description": JD, "cv": CV})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let run_id = body["run_id"].as_str().unwrap().to_string();

        let mut run = Value::Null;
        for _ in 0..100 {
            let (_, body) = send(&app, "GET", &format!("/api/v1/runs/{run_id}"), None).await;
            if body["state"] == "completed" {
                run = body;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(run["state"], "completed");
        assert_eq!(run["provider_plan"], json!(["primary", "backup"]));
        assert_eq!(run["stages"][2]["status"], "skipped");

        let (status, analysis) = send(
            &app,
            "GET",
            &format!("/api/v1/runs/{run_id}/artifacts/analyze"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(analysis["missing_critical"], json!(["Kubernetes"]));

        let (status, body) = send(
            &app,
            "GET",
            &format!("/api/v1/runs/{run_id}/artifacts/cover_letter"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, _) = send(
            &app,
            "GET",
            &format!("/api/v1/runs/{run_id}/artifacts/render"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "POST", &format!("/api/v1/runs/{run_id}/cancel"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancel_requested"], false);
    }

    #[tokio::test]
    async fn test_run_rejects_bad_input() {
        let app = app(ScriptedClient::always("{}"));

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/runs",
            Some(json!({"job_description": JD, "cv": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/runs",
            Some(json!({"job_description": JD, "cv": CV, "provider": "unkeyed"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(
            &app,
            "GET",
            "/api/v1/runs/00000000-0000-0000-0000-000000000000",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_provider_listing_switch_and_health() {
        let app = app(ScriptedClient::always("pong"));

        let (status, list) = send(&app, "GET", "/api/v1/providers", None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["primary", "backup", "unkeyed"]);
        assert_eq!(list[2]["configured"], false);
        assert!(list[0].get("credential_env").is_none());

        let (status, list) = send(
            &app,
            "PUT",
            "/api/v1/providers/active",
            Some(json!({"name": "backup"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list[1]["active"], true);

        let (status, body) = send(
            &app,
            "PUT",
            "/api/v1/providers/active",
            Some(json!({"name": "unkeyed"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "PROVIDER_NOT_CONFIGURED");

        let (_, body) = send(&app, "POST", "/api/v1/providers/primary/health", None).await;
        assert_eq!(body["healthy"], true);
        let (_, body) = send(&app, "POST", "/api/v1/providers/backup/health", None).await;
        assert_eq!(body["healthy"], false);
        let (_, list) = send(&app, "GET", "/api/v1/providers", None).await;
        assert_eq!(list[1]["healthy"], false);
    }
}
