//! Pipeline Orchestrator — runs analyze → optimize → (cover letter) for one run.
//!
//! Flow per stage: checkpoint (cancellation, state transition, persist) →
//! attempt machine over the captured provider plan → contract enforcement →
//! at most one repair call on the same provider → post-processing → persist.
//!
//! Stages within a run are strictly sequential. Runs are independent tokio
//! tasks sharing only the registry and the run store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::contract::{self, schema, Violation};
use crate::generation::{analyzer, cover_letter, optimizer, Sampling};
use crate::llm_client::prompts::{repair_message, PromptStore};
use crate::llm_client::registry::{PlannedProvider, ProviderPlan, ProviderRegistry, RegistryError, ACTIVE};
use crate::llm_client::CompletionError;
use crate::models::analysis::RawAnalysis;
use crate::models::cover_letter::{RawCoverLetter, Tone};
use crate::models::profile::{CandidateProfile, JobDescription};
use crate::models::resume::OptimizedResume;
use crate::models::run::{
    AttemptOutcome, AttemptRecord, ErrorKind, PipelineRun, ProviderFailure, RunState, Stage,
    StageFailure, StageStatus,
};
use crate::pipeline::attempt::{AttemptState, RetryPolicy};
use crate::pipeline::state_machine::advance;
use crate::pipeline::store::RunStore;
use crate::scoring::ats::AtsScorer;

// ────────────────────────────────────────────────────────────────────────────
// Public API types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    pub job_description: String,
    pub cv: String,
    #[serde(default)]
    pub generate_cover_letter: bool,
    /// Only read by the cover-letter stage.
    #[serde(default)]
    pub tone: Tone,
    /// `"active"` or a provider profile name.
    #[serde(default = "default_provider")]
    pub provider: String,
}

fn default_provider() -> String {
    ACTIVE.to_string()
}

/// Errors raised before a run exists. Once a run has started, every failure is
/// recorded on the run itself as a [`StageFailure`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0} must not be empty")]
    EmptyInput(&'static str),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("run store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Per-run inputs that never change after start.
struct RunContext {
    jd: JobDescription,
    cv: CandidateProfile,
    plan: ProviderPlan,
    cancel: CancellationToken,
}

/// Why stage execution stopped early.
enum Halt {
    Failed(StageFailure),
    Cancelled,
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

pub struct PipelineOrchestrator {
    registry: Arc<ProviderRegistry>,
    prompts: Arc<dyn PromptStore>,
    store: Arc<dyn RunStore>,
    scorer: AtsScorer,
    policy: RetryPolicy,
    cancellations: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl PipelineOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        prompts: Arc<dyn PromptStore>,
        store: Arc<dyn RunStore>,
    ) -> Self {
        Self {
            registry,
            prompts,
            store,
            scorer: AtsScorer::default(),
            policy: RetryPolicy::default(),
            cancellations: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Creates and persists the run, then executes it in its own task.
    pub async fn start(self: &Arc<Self>, request: RunRequest) -> Result<Uuid, PipelineError> {
        let (run, ctx) = self.prepare(request).await?;
        let id = run.id;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.drive(run, ctx).await;
        });
        Ok(id)
    }

    /// Creates the run and executes it on the caller's task.
    pub async fn run_to_completion(&self, request: RunRequest) -> Result<PipelineRun, PipelineError> {
        let (run, ctx) = self.prepare(request).await?;
        Ok(self.drive(run, ctx).await)
    }

    /// Requests cooperative cancellation. Takes effect at the next stage boundary.
    /// Returns `false` if the run is unknown or already finished.
    pub fn cancel(&self, id: Uuid) -> bool {
        let token = self.tokens().get(&id).cloned();
        match token {
            Some(token) => {
                info!(run_id = %id, "cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn prepare(&self, request: RunRequest) -> Result<(PipelineRun, RunContext), PipelineError> {
        if request.job_description.trim().is_empty() {
            return Err(PipelineError::EmptyInput("job_description"));
        }
        if request.cv.trim().is_empty() {
            return Err(PipelineError::EmptyInput("cv"));
        }

        let plan = self.registry.plan(&request.provider)?;
        let run = PipelineRun::new(request.generate_cover_letter, plan.names()).with_tone(request.tone);
        let cancel = CancellationToken::new();
        self.tokens().insert(run.id, cancel.clone());

        if let Err(e) = self.store.save(&run).await {
            self.tokens().remove(&run.id);
            return Err(PipelineError::Store(e));
        }
        info!(
            run_id = %run.id,
            plan = ?run.provider_plan,
            cover_letter = run.generate_cover_letter,
            "pipeline run created"
        );

        let ctx = RunContext {
            jd: JobDescription::new(request.job_description),
            cv: CandidateProfile::new(request.cv),
            plan,
            cancel,
        };
        Ok((run, ctx))
    }

    async fn drive(&self, mut run: PipelineRun, ctx: RunContext) -> PipelineRun {
        let terminal = match self.execute_stages(&mut run, &ctx).await {
            Ok(()) => RunState::Completed,
            Err(Halt::Failed(failure)) => {
                warn!(run_id = %run.id, "{failure}");
                run.failure = Some(failure);
                RunState::Failed
            }
            Err(Halt::Cancelled) => RunState::Cancelled,
        };
        run.skip_remaining();
        // Illegal edges are logged inside `advance`.
        let _ = advance(&mut run, terminal);
        self.persist(&run).await;
        self.tokens().remove(&run.id);
        info!(run_id = %run.id, state = %run.state, "pipeline run finished");
        run
    }

    async fn execute_stages(&self, run: &mut PipelineRun, ctx: &RunContext) -> Result<(), Halt> {
        // Analyze
        self.begin_stage(run, ctx, Stage::Analyze).await?;
        let raw: RawAnalysis = self
            .run_stage(
                run,
                ctx,
                Stage::Analyze,
                analyzer::user_message(&ctx.jd, &ctx.cv),
                analyzer::SAMPLING,
                schema::validate_analysis,
            )
            .await?;
        let analysis = analyzer::finalize(raw, &ctx.jd, &ctx.cv, &self.scorer);
        info!(
            run_id = %run.id,
            ats_score = analysis.ats_score,
            model_ats_score = analysis.model_ats_score,
            "analysis complete"
        );
        run.artifacts.analysis = Some(analysis.clone());
        self.finish_stage(run, Stage::Analyze).await;

        // Optimize
        self.begin_stage(run, ctx, Stage::Optimize).await?;
        let cv = &ctx.cv;
        let raw: OptimizedResume = self
            .run_stage(
                run,
                ctx,
                Stage::Optimize,
                optimizer::user_message(&ctx.jd, &ctx.cv, &analysis),
                optimizer::SAMPLING,
                |payload: &Value| schema::validate_optimized_resume(payload, cv),
            )
            .await?;
        let resume = optimizer::finalize(raw);
        run.artifacts.optimized_resume = Some(resume.clone());
        self.finish_stage(run, Stage::Optimize).await;

        if !run.generate_cover_letter {
            return Ok(());
        }

        // Cover letter
        self.begin_stage(run, ctx, Stage::CoverLetter).await?;
        let message = cover_letter::user_message(&ctx.jd, &analysis, &resume, run.tone);
        let raw: RawCoverLetter = self
            .run_stage(
                run,
                ctx,
                Stage::CoverLetter,
                message,
                cover_letter::SAMPLING,
                schema::validate_cover_letter,
            )
            .await?;
        run.artifacts.cover_letter = Some(cover_letter::finalize(raw, &ctx.jd));
        self.finish_stage(run, Stage::CoverLetter).await;

        Ok(())
    }

    /// Stage boundary: the only place cancellation is observed.
    async fn begin_stage(&self, run: &mut PipelineRun, ctx: &RunContext, stage: Stage) -> Result<(), Halt> {
        if ctx.cancel.is_cancelled() {
            info!(run_id = %run.id, "run cancelled before stage '{stage}'");
            return Err(Halt::Cancelled);
        }
        let _ = advance(run, RunState::for_stage(stage));
        let record = run.stage_mut(stage);
        record.status = StageStatus::Running;
        record.started_at = Some(Utc::now());
        self.persist(run).await;
        Ok(())
    }

    async fn finish_stage(&self, run: &mut PipelineRun, stage: Stage) {
        let record = run.stage_mut(stage);
        record.status = StageStatus::Succeeded;
        record.finished_at = Some(Utc::now());
        run.touch();
        self.persist(run).await;
    }

    /// Drives the attempt machine for one stage and returns the validated payload.
    async fn run_stage<T, V>(
        &self,
        run: &mut PipelineRun,
        ctx: &RunContext,
        stage: Stage,
        user_message: String,
        sampling: Sampling,
        validate: V,
    ) -> Result<T, Halt>
    where
        T: DeserializeOwned,
        V: Fn(&Value) -> Vec<Violation>,
    {
        let system_prompt = self.prompts.system_prompt(stage);
        let mut failures: Vec<ProviderFailure> = Vec::new();
        let mut last_error = ErrorKind::NoProvidersConfigured;
        let mut state = AttemptState::Trying {
            provider: 0,
            attempt: 1,
        };

        let outcome = loop {
            match state {
                AttemptState::Trying { provider, attempt } => {
                    let Some(planned) = ctx.plan.get(provider) else {
                        state = AttemptState::Exhausted;
                        continue;
                    };
                    let call = self
                        .call(run, stage, planned, attempt, false, &system_prompt, &user_message, sampling)
                        .await;
                    match call {
                        Ok(text) => {
                            break self
                                .enforce_with_repair(
                                    run,
                                    stage,
                                    planned,
                                    &system_prompt,
                                    &user_message,
                                    sampling,
                                    &text,
                                    &validate,
                                )
                                .await
                                .map_err(|failure| (failure, planned.name.clone()));
                        }
                        Err(err) => {
                            last_error = err.kind();
                            state = self.policy.on_failure(provider, attempt, &err, ctx.plan.len());
                            if !matches!(state, AttemptState::BackingOff { .. }) {
                                failures.push(ProviderFailure {
                                    provider: planned.name.clone(),
                                    last_error,
                                    detail: format!("{last_error} after {attempt} attempt(s)"),
                                });
                            }
                        }
                    }
                }
                AttemptState::BackingOff {
                    provider,
                    attempt,
                    delay,
                } => {
                    warn!(
                        run_id = %run.id,
                        stage = %stage,
                        provider = ctx.plan.get(provider).map(|p| p.name.as_str()).unwrap_or("?"),
                        "backing off {}ms before attempt {attempt}",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    state = AttemptState::Trying { provider, attempt };
                }
                AttemptState::FallingOver { next } => {
                    warn!(
                        run_id = %run.id,
                        stage = %stage,
                        last_error = %last_error,
                        "falling over to provider '{}'",
                        ctx.plan.get(next).map(|p| p.name.as_str()).unwrap_or("?")
                    );
                    state = AttemptState::Trying {
                        provider: next,
                        attempt: 1,
                    };
                }
                AttemptState::Exhausted => {
                    break Err(((last_error, String::new()), String::new()));
                }
            }
        };

        match outcome {
            Ok(value) => Ok(value),
            Err(((kind, detail), provider)) => {
                if !provider.is_empty() {
                    failures.push(ProviderFailure {
                        provider,
                        last_error: kind,
                        detail,
                    });
                }
                let record = run.stage_mut(stage);
                record.status = StageStatus::Failed;
                record.error = Some(kind);
                record.finished_at = Some(Utc::now());
                Err(Halt::Failed(StageFailure {
                    stage,
                    attempted_providers: failures,
                    last_error: kind,
                }))
            }
        }
    }

    /// Contract enforcement with exactly one repair call on the same provider.
    /// Never falls over: a second contract failure is terminal for the stage.
    #[allow(clippy::too_many_arguments)]
    async fn enforce_with_repair<T, V>(
        &self,
        run: &mut PipelineRun,
        stage: Stage,
        planned: &PlannedProvider,
        system_prompt: &str,
        user_message: &str,
        sampling: Sampling,
        text: &str,
        validate: &V,
    ) -> Result<T, (ErrorKind, String)>
    where
        T: DeserializeOwned,
        V: Fn(&Value) -> Vec<Violation>,
    {
        let first = match contract::enforce::<T, _>(text, validate) {
            Ok(value) => {
                run.stage_mut(stage).provider = Some(planned.name.clone());
                return Ok(value);
            }
            Err(e) => e,
        };

        let violations = first.violations();
        warn!(
            run_id = %run.id,
            stage = %stage,
            provider = %planned.name,
            error = %first.kind(),
            violations = violations.len(),
            "output failed contract, requesting repair"
        );
        let repair = repair_message(user_message, text, &violations);

        let repaired_text = self
            .call_with_backoff(run, stage, planned, system_prompt, &repair, sampling)
            .await
            .map_err(|err| (err.kind(), format!("repair call failed: {}", err.kind())))?;

        match contract::enforce::<T, _>(&repaired_text, validate) {
            Ok(value) => {
                info!(run_id = %run.id, stage = %stage, provider = %planned.name, "repair accepted");
                let record = run.stage_mut(stage);
                record.repaired = true;
                record.provider = Some(planned.name.clone());
                Ok(value)
            }
            Err(second) => {
                warn!(
                    run_id = %run.id,
                    stage = %stage,
                    provider = %planned.name,
                    "repair rejected: {second}"
                );
                Err((
                    second.kind(),
                    format!("{} after repair ({} violation(s))", second.kind(), second.violations().len()),
                ))
            }
        }
    }

    /// Repair call: may back off on retryable errors, never changes provider.
    async fn call_with_backoff(
        &self,
        run: &mut PipelineRun,
        stage: Stage,
        planned: &PlannedProvider,
        system_prompt: &str,
        user_message: &str,
        sampling: Sampling,
    ) -> Result<String, CompletionError> {
        let mut attempt = 1;
        loop {
            match self
                .call(run, stage, planned, attempt, true, system_prompt, user_message, sampling)
                .await
            {
                Ok(text) => return Ok(text),
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    attempt += 1;
                    let delay = self.policy.delay(attempt, &err);
                    warn!(
                        run_id = %run.id,
                        stage = %stage,
                        provider = %planned.name,
                        "repair call failed ({err}), retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One `complete()` invocation, counted and traced.
    #[allow(clippy::too_many_arguments)]
    async fn call(
        &self,
        run: &mut PipelineRun,
        stage: Stage,
        planned: &PlannedProvider,
        attempt: u32,
        repair: bool,
        system_prompt: &str,
        user_message: &str,
        sampling: Sampling,
    ) -> Result<String, CompletionError> {
        run.stage_mut(stage).model_calls += 1;
        debug!(
            run_id = %run.id,
            stage = %stage,
            provider = %planned.name,
            attempt,
            repair,
            "calling provider"
        );

        let result = planned
            .client
            .complete(system_prompt, user_message, sampling.temperature, sampling.max_output_tokens)
            .await;

        let outcome = match &result {
            Ok(_) => AttemptOutcome::Completed,
            Err(err) => {
                warn!(
                    run_id = %run.id,
                    stage = %stage,
                    provider = %planned.name,
                    attempt,
                    "provider call failed: {err}"
                );
                AttemptOutcome::Failed(err.kind())
            }
        };
        run.attempts.push(AttemptRecord {
            stage,
            provider: planned.name.clone(),
            attempt,
            repair,
            outcome,
            at: Utc::now(),
        });
        result
    }

    async fn persist(&self, run: &PipelineRun) {
        if let Err(e) = self.store.save(run).await {
            warn!(run_id = %run.id, error = %e, "failed to persist run");
        }
    }

    fn tokens(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
        self.cancellations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
