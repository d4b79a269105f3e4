use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::analysis::MatchAnalysis;
use crate::models::cover_letter::{CoverLetter, Tone};
use crate::models::resume::OptimizedResume;

/// One phase of the pipeline. Serialized as `analyze`, `optimize`, `cover_letter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analyze,
    Optimize,
    CoverLetter,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Analyze, Stage::Optimize, Stage::CoverLetter];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Analyze => "analyze",
            Stage::Optimize => "optimize",
            Stage::CoverLetter => "cover_letter",
        }
    }

    pub fn parse(s: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| stage.as_str() == s)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline state. Every run starts at `Pending` and ends at `Completed`,
/// `Failed` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Analyzing,
    Optimizing,
    DraftingCoverLetter,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// The state a run is in while `stage` executes.
    pub fn for_stage(stage: Stage) -> RunState {
        match stage {
            Stage::Analyze => RunState::Analyzing,
            Stage::Optimize => RunState::Optimizing,
            Stage::CoverLetter => RunState::DraftingCoverLetter,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Analyzing => "Analyzing",
            Self::Optimizing => "Optimizing",
            Self::DraftingCoverLetter => "DraftingCoverLetter",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// Error kinds recorded in attempt traces and stage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    AuthError,
    RateLimited,
    ProviderUnavailable,
    MalformedUpstreamResponse,
    UnparsableOutput,
    SchemaInvalid,
    NoProvidersConfigured,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::AuthError => "auth_error",
            Self::RateLimited => "rate_limited",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::MalformedUpstreamResponse => "malformed_upstream_response",
            Self::UnparsableOutput => "unparsable_output",
            Self::SchemaInvalid => "schema_invalid",
            Self::NoProvidersConfigured => "no_providers_configured",
        };
        f.write_str(s)
    }
}

/// Per-stage status as exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    /// Every `complete()` invocation made for this stage, repairs included.
    pub model_calls: u32,
    pub repaired: bool,
    /// Provider that produced the accepted output.
    pub provider: Option<String>,
    pub error: Option<ErrorKind>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageRecord {
    fn pending(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            model_calls: 0,
            repaired: false,
            provider: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Outcome of a single provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Completed,
    Failed(ErrorKind),
}

/// One entry in the attempted-providers trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub stage: Stage,
    pub provider: String,
    /// 1-based attempt number against this provider.
    pub attempt: u32,
    pub repair: bool,
    pub outcome: AttemptOutcome,
    pub at: DateTime<Utc>,
}

/// Last error seen from one provider during a failed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub last_error: ErrorKind,
    pub detail: String,
}

/// Terminal failure of a stage. Surfaced to callers; never a raw transport error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub attempted_providers: Vec<ProviderFailure>,
    pub last_error: ErrorKind,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers: Vec<String> = self
            .attempted_providers
            .iter()
            .map(|p| format!("{} ({})", p.provider, p.last_error))
            .collect();
        write!(
            f,
            "stage '{}' failed with {}; attempted: [{}]",
            self.stage,
            self.last_error,
            providers.join(", ")
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunArtifacts {
    pub analysis: Option<MatchAnalysis>,
    pub optimized_resume: Option<OptimizedResume>,
    pub cover_letter: Option<CoverLetter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: RunState,
    pub to: RunState,
    pub at: DateTime<Utc>,
}

/// A single pipeline execution. Owned by the orchestrator while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub state: RunState,
    pub generate_cover_letter: bool,
    #[serde(default)]
    pub tone: Tone,
    /// Provider order captured at start. Later registry switches never change it.
    pub provider_plan: Vec<String>,
    pub stages: Vec<StageRecord>,
    pub attempts: Vec<AttemptRecord>,
    pub artifacts: RunArtifacts,
    pub failure: Option<StageFailure>,
    pub transitions: Vec<TransitionRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn new(generate_cover_letter: bool, provider_plan: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            state: RunState::Pending,
            generate_cover_letter,
            tone: Tone::default(),
            provider_plan,
            stages: Stage::ALL.into_iter().map(StageRecord::pending).collect(),
            attempts: Vec::new(),
            artifacts: RunArtifacts::default(),
            failure: None,
            transitions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }

    pub fn stage(&self, stage: Stage) -> &StageRecord {
        // Constructed with one record per stage, in Stage::ALL order.
        &self.stages[stage as usize]
    }

    pub fn stage_mut(&mut self, stage: Stage) -> &mut StageRecord {
        &mut self.stages[stage as usize]
    }

    /// Marks every still-pending stage as skipped.
    pub fn skip_remaining(&mut self) {
        for record in &mut self.stages {
            if record.status == StageStatus::Pending {
                record.status = StageStatus::Skipped;
            }
        }
    }

    /// Distinct providers in the order they were first attempted for `stage`.
    pub fn attempted_providers(&self, stage: Stage) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for record in self.attempts.iter().filter(|a| a.stage == stage) {
            if !seen.contains(&record.provider.as_str()) {
                seen.push(&record.provider);
            }
        }
        seen
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
