use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Wire shape a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
    Anthropic,
}

/// One named backend profile.
///
/// `credential_env` names the environment variable holding the API key. The
/// key itself is read only when the client is built and is never stored here.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub model: String,
    pub endpoint: String,
    #[serde(default, skip_serializing)]
    pub credential_env: Option<String>,
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("priority", &self.priority)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Application configuration loaded from environment variables.
/// Fails at startup if a variable is present but malformed.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres run store when set; in-memory store otherwise.
    pub database_url: Option<String>,
    /// Directory of `<stage>.md` system prompts overriding the built-ins.
    pub prompts_dir: Option<PathBuf>,
    /// Initial active provider profile.
    pub llm_provider: Option<String>,
    pub providers: Vec<ProviderConfig>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let timeout_secs = optional_env("LLM_TIMEOUT_SECS")
            .map(|v| {
                v.parse::<u64>()
                    .context("LLM_TIMEOUT_SECS must be a positive integer")
            })
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let enable_local = optional_env("ENABLE_LOCAL_LLM_FALLBACK")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let mut providers = builtin_profiles(timeout_secs, enable_local);
        if let Some(path) = optional_env("LLM_PROVIDERS_FILE") {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read LLM_PROVIDERS_FILE '{path}'"))?;
            let extra: Vec<ProviderConfig> = serde_json::from_str(&raw)
                .with_context(|| format!("LLM_PROVIDERS_FILE '{path}' is not a JSON list of profiles"))?;
            merge_profiles(&mut providers, extra);
        }

        Ok(Config {
            database_url: optional_env("DATABASE_URL"),
            prompts_dir: optional_env("PROMPTS_DIR").map(PathBuf::from),
            llm_provider: optional_env("LLM_PROVIDER"),
            providers,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Profiles known out of the box. Credentials are referenced by env-var name;
/// the local Ollama profile needs none and is only offered when enabled.
pub fn builtin_profiles(timeout_secs: u64, enable_local: bool) -> Vec<ProviderConfig> {
    let profile = |name: &str, kind: ProviderKind, model: &str, endpoint: &str, priority: u32| {
        ProviderConfig {
            name: name.to_string(),
            kind,
            model: model.to_string(),
            endpoint: endpoint.to_string(),
            credential_env: None,
            priority,
            timeout_secs,
        }
    };
    let keyed = |config: ProviderConfig, env: &str| ProviderConfig {
        credential_env: Some(env.to_string()),
        ..config
    };

    let mut profiles = vec![
        keyed(
            profile("cerebras", ProviderKind::OpenAiCompatible, "gpt-oss-120b", "https://api.cerebras.ai/v1", 10),
            "CEREBRAS_API_KEY",
        ),
        keyed(
            profile("openai", ProviderKind::OpenAiCompatible, "gpt-4", "https://api.openai.com/v1", 20),
            "OPENAI_API_KEY",
        ),
        keyed(
            profile("deepseek", ProviderKind::OpenAiCompatible, "deepseek-chat", "https://api.deepseek.com/v1", 30),
            "DEEPSEEK_API_KEY",
        ),
        keyed(
            profile("anthropic", ProviderKind::Anthropic, "claude-sonnet-4-5", "https://api.anthropic.com", 40),
            "ANTHROPIC_API_KEY",
        ),
    ];
    if enable_local {
        profiles.push(profile(
            "ollama",
            ProviderKind::OpenAiCompatible,
            "llama3",
            "http://localhost:11434/v1",
            100,
        ));
    }
    profiles
}

/// Adds `extra` profiles, replacing built-ins with the same name.
pub fn merge_profiles(profiles: &mut Vec<ProviderConfig>, extra: Vec<ProviderConfig>) {
    for profile in extra {
        match profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile,
            None => profiles.push(profile),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_gate_local_fallback() {
        let names = |v: Vec<ProviderConfig>| v.into_iter().map(|p| p.name).collect::<Vec<_>>();
        assert_eq!(
            names(builtin_profiles(60, false)),
            vec!["cerebras", "openai", "deepseek", "anthropic"]
        );
        let with_local = builtin_profiles(60, true);
        let ollama = with_local.iter().find(|p| p.name == "ollama").unwrap();
        assert_eq!(ollama.credential_env, None);
    }

    #[test]
    fn test_merge_replaces_and_appends() {
        let mut profiles = builtin_profiles(60, false);
        let extra: Vec<ProviderConfig> = serde_json::from_str(
            r#"[
                {"name": "openai", "kind": "openai-compatible", "model": "gpt-4o",
                 "endpoint": "https://api.openai.com/v1", "credential_env": "OPENAI_API_KEY",
                 "priority": 5},
                {"name": "groq", "kind": "openai-compatible", "model": "llama-3.1-70b",
                 "endpoint": "https://api.groq.com/openai/v1", "credential_env": "GROQ_API_KEY"}
            ]"#,
        )
        .unwrap();
        merge_profiles(&mut profiles, extra);

        let openai = profiles.iter().find(|p| p.name == "openai").unwrap();
        assert_eq!(openai.model, "gpt-4o");
        assert_eq!(openai.priority, 5);
        let groq = profiles.iter().find(|p| p.name == "groq").unwrap();
        assert_eq!(groq.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(profiles.len(), 5);
    }

    #[test]
    fn test_credential_reference_is_not_serialized_or_debugged() {
        let profile = &builtin_profiles(60, false)[0];
        let json = serde_json::to_string(profile).unwrap();
        assert!(!json.contains("CEREBRAS_API_KEY"));
        assert!(!format!("{profile:?}").contains("CEREBRAS_API_KEY"));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" 1 "));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("nope"));
    }
}
