// Pipeline orchestration: stage sequencing, retry/fallover/repair, run persistence.

pub mod attempt;
pub mod orchestrator;
pub mod state_machine;
pub mod store;

pub use orchestrator::{PipelineError, PipelineOrchestrator, RunRequest};
