//! Provider Registry — every configured backend, its health, and the active choice.
//!
//! The registry is the only shared mutable state between runs. Writes happen on
//! `switch` and on health-flag updates, each a single short write-lock section.
//! A run never holds a reference into the registry: it captures a
//! [`ProviderPlan`] (names plus cloned client handles) once, at start.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ProviderConfig, ProviderKind, DEFAULT_TIMEOUT_SECS};
use crate::llm_client::CompletionClient;

/// Plan preference meaning "whatever is active right now".
pub const ACTIVE: &str = "active";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("provider '{0}' is not configured")]
    NotConfigured(String),

    #[error("no LLM providers are configured")]
    NoProvidersConfigured,
}

struct ProviderEntry {
    config: ProviderConfig,
    /// `None` when the credential is absent.
    client: Option<Arc<dyn CompletionClient>>,
    healthy: bool,
}

impl ProviderEntry {
    fn is_configured(&self) -> bool {
        self.client.is_some()
    }
}

#[derive(Default)]
struct RegistryInner {
    /// Sorted by priority, lowest first; registration order breaks ties.
    entries: Vec<ProviderEntry>,
    active: Option<String>,
}

impl RegistryInner {
    fn entry(&self, name: &str) -> Option<&ProviderEntry> {
        self.entries.iter().find(|e| e.config.name == name)
    }

    fn configured_client(&self, name: &str) -> Option<Arc<dyn CompletionClient>> {
        self.entry(name).and_then(|e| e.client.clone())
    }
}

/// Public view of one provider. Never carries credentials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub model: String,
    pub kind: ProviderKind,
    pub priority: u32,
    pub configured: bool,
    pub healthy: bool,
    pub active: bool,
}

/// One step in a run's provider plan.
#[derive(Clone)]
pub struct PlannedProvider {
    pub name: String,
    pub client: Arc<dyn CompletionClient>,
}

/// Ordered providers captured for one run. Later registry changes never touch it.
#[derive(Clone)]
pub struct ProviderPlan(Vec<PlannedProvider>);

impl ProviderPlan {
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|p| p.name.clone()).collect()
    }

    pub fn get(&self, index: usize) -> Option<&PlannedProvider> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Default)]
pub struct ProviderRegistry {
    inner: RwLock<RegistryInner>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from profiles. `build` returns `Ok(None)` for a profile
    /// whose credential is missing; it is kept and listed as unconfigured.
    /// The initial active provider is `active` if configured, otherwise the
    /// highest-priority configured profile.
    pub fn from_configs<F>(
        configs: Vec<ProviderConfig>,
        active: Option<&str>,
        build: F,
    ) -> anyhow::Result<Self>
    where
        F: Fn(&ProviderConfig) -> anyhow::Result<Option<Arc<dyn CompletionClient>>>,
    {
        let registry = Self::new();
        for config in configs {
            let client = build(&config)?;
            registry.register(config, client);
        }

        if let Some(name) = active {
            if let Err(e) = registry.switch(name) {
                warn!("LLM_PROVIDER '{name}' ignored: {e}");
            }
        }
        if registry.active().is_none() {
            let first = registry
                .read()
                .entries
                .iter()
                .find(|e| e.is_configured())
                .map(|e| e.config.name.clone());
            if let Some(name) = first {
                registry.write().active = Some(name);
            }
        }
        Ok(registry)
    }

    /// Adds or replaces a provider. A replaced entry starts healthy again.
    pub fn register(&self, config: ProviderConfig, client: Option<Arc<dyn CompletionClient>>) {
        let mut inner = self.write();
        inner.entries.retain(|e| e.config.name != config.name);
        inner.entries.push(ProviderEntry {
            config,
            client,
            healthy: true,
        });
        inner.entries.sort_by_key(|e| e.config.priority);
    }

    pub fn select(&self, name: &str) -> Result<Arc<dyn CompletionClient>, RegistryError> {
        self.read()
            .configured_client(name)
            .ok_or_else(|| RegistryError::NotConfigured(name.to_string()))
    }

    /// Atomically makes `name` the active provider. Runs already started keep their plan.
    pub fn switch(&self, name: &str) -> Result<(), RegistryError> {
        let mut inner = self.write();
        if inner.configured_client(name).is_none() {
            return Err(RegistryError::NotConfigured(name.to_string()));
        }
        let previous = inner.active.replace(name.to_string());
        info!(from = ?previous, to = name, "active LLM provider switched");
        Ok(())
    }

    pub fn active(&self) -> Option<String> {
        self.read().active.clone()
    }

    pub fn list(&self) -> Vec<ProviderStatus> {
        let inner = self.read();
        inner
            .entries
            .iter()
            .map(|e| ProviderStatus {
                name: e.config.name.clone(),
                model: e.config.model.clone(),
                kind: e.config.kind,
                priority: e.config.priority,
                configured: e.is_configured(),
                healthy: e.healthy,
                active: inner.active.as_deref() == Some(e.config.name.as_str()),
            })
            .collect()
    }

    /// Sends a minimal ping. Failure marks the provider degraded, success clears it.
    /// A degraded provider stays listed and stays in plans.
    pub async fn health_check(&self, name: &str) -> Result<bool, RegistryError> {
        let client = self.select(name)?;
        let timeout_secs = self
            .read()
            .entry(name)
            .map(|e| e.config.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let ping = client.complete("ping", "ping", 0.0, 1);
        let healthy = match tokio::time::timeout(Duration::from_secs(timeout_secs), ping).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(provider = name, error = %e, "health check failed");
                false
            }
            Err(_) => {
                warn!(provider = name, "health check timed out after {timeout_secs}s");
                false
            }
        };

        if let Some(entry) = self.write().entries.iter_mut().find(|e| e.config.name == name) {
            entry.healthy = healthy;
        }
        Ok(healthy)
    }

    /// Orders configured providers for a new run: the preferred one (`"active"`
    /// or a profile name) first, then the rest by priority with degraded
    /// providers after healthy ones.
    pub fn plan(&self, preference: &str) -> Result<ProviderPlan, RegistryError> {
        let inner = self.read();

        let preferred = if preference == ACTIVE {
            inner.active.clone()
        } else {
            if inner.configured_client(preference).is_none() {
                return Err(RegistryError::NotConfigured(preference.to_string()));
            }
            Some(preference.to_string())
        };

        let mut plan = Vec::new();
        if let Some(name) = &preferred {
            if let Some(client) = inner.configured_client(name) {
                plan.push(PlannedProvider {
                    name: name.clone(),
                    client,
                });
            }
        }

        let rest = inner
            .entries
            .iter()
            .filter(|e| Some(&e.config.name) != preferred.as_ref());
        let (healthy, degraded): (Vec<_>, Vec<_>) = rest.partition(|e| e.healthy);
        for entry in healthy.into_iter().chain(degraded) {
            if let Some(client) = &entry.client {
                plan.push(PlannedProvider {
                    name: entry.config.name.clone(),
                    client: client.clone(),
                });
            }
        }

        let plan = ProviderPlan(plan);
        if plan.is_empty() {
            return Err(RegistryError::NoProvidersConfigured);
        }
        Ok(plan)
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
