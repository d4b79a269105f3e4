// Stage definitions for the pipeline: user-message builders, sampling parameters
// and deterministic post-processing of validated model output.
// No network calls here; the orchestrator owns every `complete()` invocation.

pub mod analyzer;
pub mod cover_letter;
pub mod optimizer;

/// Sampling parameters for one stage's completion calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_output_tokens: u32,
}
