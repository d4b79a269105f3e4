use std::sync::Arc;

use crate::llm_client::registry::ProviderRegistry;
use crate::pipeline::store::RunStore;
use crate::pipeline::PipelineOrchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: PipelineOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        self.orchestrator.registry()
    }

    pub fn runs(&self) -> &Arc<dyn RunStore> {
        self.orchestrator.store()
    }
}
