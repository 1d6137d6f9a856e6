//! The pipeline engine: drives one run from the entry stage to termination.
//!
//! ## Run loop
//!
//! ```text
//! state = PipelineState::new(input)            // cursor at Refine
//! while let Some(stage) = state.current_stage() {
//!     checkpoint: cancellation, step limit
//!     output = registry[stage].execute(&state)  // fatal on error
//!     record audit event
//!     check ownership, resolve route, check Review's retry count
//!     apply update; on Escalate reset retry count and feedback
//!     move cursor to route target (None on Terminate)
//! }
//! ```
//!
//! Every fatal error ends the run immediately and returns the state
//! accumulated so far in a [`RunFailure`]. Given the same sequence of
//! generator responses the engine makes the same sequence of decisions; it
//! holds no randomness of its own beyond the run id.

use std::sync::Arc;

use pipeline::{
    AuditEvent, ContentGenerator, Directive, DirectiveKind, PipelineError, PipelineRunId,
    PipelineState, RetryCeiling, Route, RoutingTable, Stage, StageId, StageOutput, StateUpdate,
    StepLimit,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::registry::StageRegistry;
use crate::stages;

// ---------------------------------------------------------------------------
// Run results
// ---------------------------------------------------------------------------

/// A run that reached Package's `Terminate` directive.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: PipelineRunId,
    /// Final state, including the complete audit trail.
    pub state: PipelineState,
}

impl RunOutcome {
    /// Number of stage invocations the run performed.
    pub fn steps(&self) -> usize {
        self.state.audit_trail().len()
    }
}

/// A run that stopped on a fatal error.
///
/// The partial state is kept: artifacts produced before the failure are
/// often what is needed to diagnose it.
#[derive(Debug, Clone, Error)]
#[error("Run {run_id} failed at stage '{stage}': {cause}")]
pub struct RunFailure {
    pub run_id: PipelineRunId,
    /// Stage that failed, or that was about to run when the run was stopped.
    pub stage: StageId,
    #[source]
    pub cause: PipelineError,
    pub partial_state: PipelineState,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles an [`Engine`].
///
/// Explicitly registered stages take precedence; every stage id left
/// unregistered is filled with its default implementation backed by the
/// configured generator.
#[derive(Default)]
pub struct EngineBuilder {
    registry: StageRegistry,
    generator: Option<Arc<dyn ContentGenerator>>,
    retry_ceiling: RetryCeiling,
    step_limit: StepLimit,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backs every stage not registered explicitly with `generator`.
    pub fn generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Registers a custom stage implementation under its own id.
    pub fn stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.registry.register(stage);
        self
    }

    pub fn retry_ceiling(mut self, ceiling: RetryCeiling) -> Self {
        self.retry_ceiling = ceiling;
        self
    }

    pub fn step_limit(mut self, limit: StepLimit) -> Self {
        self.step_limit = limit;
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] if some stage has neither an
    /// explicit implementation nor a generator to build the default one.
    pub fn build(self) -> Result<Engine, PipelineError> {
        let mut registry = self.registry;

        if let Some(generator) = self.generator {
            for id in registry.missing() {
                registry.register(stages::default_stage(
                    id,
                    Arc::clone(&generator),
                    self.retry_ceiling,
                ));
            }
        }

        let missing = registry.missing();
        if !missing.is_empty() {
            let names: Vec<_> = missing.iter().map(|id| id.as_str()).collect();
            return Err(PipelineError::Configuration {
                message: format!("no stage registered for: {}", names.join(", ")),
            });
        }

        Ok(Engine {
            registry,
            routes: RoutingTable::standard(),
            retry_ceiling: self.retry_ceiling,
            step_limit: self.step_limit,
        })
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Owns the stage registry and routing table and executes runs.
///
/// Both are immutable after construction, so one engine may serve any number
/// of concurrent runs (wrap it in an `Arc`). Each run owns its own state.
#[derive(Debug)]
pub struct Engine {
    registry: StageRegistry,
    routes: RoutingTable,
    retry_ceiling: RetryCeiling,
    step_limit: StepLimit,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn retry_ceiling(&self) -> RetryCeiling {
        self.retry_ceiling
    }

    pub fn step_limit(&self) -> StepLimit {
        self.step_limit
    }

    /// Runs the pipeline for `input` to completion.
    ///
    /// # Errors
    ///
    /// Returns a [`RunFailure`] carrying the partial state on any fatal error.
    pub async fn run(&self, input: impl Into<String>) -> Result<RunOutcome, Box<RunFailure>> {
        self.run_with_cancellation(input, &CancellationToken::new())
            .await
    }

    /// Runs the pipeline, checking `cancel` before each stage starts.
    ///
    /// A stage already in flight is awaited to completion; the cancellation
    /// takes effect at the next checkpoint.
    ///
    /// # Errors
    ///
    /// Returns a [`RunFailure`] carrying the partial state on any fatal error,
    /// including [`PipelineError::Cancelled`].
    pub async fn run_with_cancellation(
        &self,
        input: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, Box<RunFailure>> {
        let run_id = PipelineRunId::new_random();
        let span = info_span!("pipeline_run", %run_id);
        self.drive(run_id, PipelineState::new(input), cancel)
            .instrument(span)
            .await
    }

    async fn drive(
        &self,
        run_id: PipelineRunId,
        mut state: PipelineState,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, Box<RunFailure>> {
        info!("Pipeline run started");

        while let Some(stage_id) = state.current_stage() {
            if let Err(cause) = self.checkpoint(stage_id, &state, cancel) {
                return Err(fail(run_id, stage_id, cause, state));
            }

            let Some(stage) = self.registry.get(stage_id) else {
                let cause = PipelineError::Configuration {
                    message: format!("no stage registered for: {stage_id}"),
                };
                return Err(fail(run_id, stage_id, cause, state));
            };

            debug!(stage = %stage_id, retry_count = state.retry_count(), "Invoking stage");
            let output = match stage.execute(&state).await {
                Ok(output) => output,
                Err(cause) => return Err(fail(run_id, stage_id, cause, state)),
            };

            if let Err(cause) = self.advance(&mut state, stage_id, output) {
                return Err(fail(run_id, stage_id, cause, state));
            }
        }

        info!(
            steps = state.audit_trail().len(),
            approved = state.approved(),
            "Pipeline run completed"
        );
        Ok(RunOutcome { run_id, state })
    }

    /// Cooperative checkpoint before each stage invocation.
    fn checkpoint(
        &self,
        next: StageId,
        state: &PipelineState,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { next });
        }
        if self.step_limit.is_exhausted_by(state.audit_trail().len()) {
            return Err(PipelineError::StepLimitExceeded {
                limit: self.step_limit,
            });
        }
        Ok(())
    }

    /// Records, validates and applies one stage output.
    ///
    /// The audit event is appended before validation so the trail always has
    /// one entry per completed invocation; the update is applied only once the
    /// output has passed every check.
    fn advance(
        &self,
        state: &mut PipelineState,
        stage_id: StageId,
        output: StageOutput,
    ) -> Result<(), PipelineError> {
        let StageOutput {
            update,
            directive,
            summary,
        } = output;

        state.record(AuditEvent::new(stage_id, directive.kind(), summary));

        let owner = update.owner();
        if owner != stage_id {
            return Err(PipelineError::OwnershipViolation {
                stage: stage_id,
                owner,
            });
        }

        let route = self.routes.resolve(stage_id, directive)?;

        if let StateUpdate::Reviewed { retry_count, .. } = &update {
            self.check_retry_count(state.retry_count(), directive.kind(), *retry_count)?;
        }

        state.apply(update);

        if directive == Directive::Escalate {
            warn!(
                ceiling = %self.retry_ceiling,
                "Retry ceiling reached; escalating to refinement"
            );
            state.reset_for_escalation();
        }

        debug!(
            stage = %stage_id,
            directive = %directive.kind(),
            next = %route,
            "Stage completed"
        );

        state.move_cursor(match route {
            Route::Stage(next) => Some(next),
            Route::Terminal => None,
        });
        Ok(())
    }

    /// Validates the retry count a Review update carries against the count
    /// the state held before the review.
    fn check_retry_count(
        &self,
        previous: u32,
        directive: DirectiveKind,
        retry_count: u32,
    ) -> Result<(), PipelineError> {
        let reached = self.retry_ceiling.is_reached_by(retry_count);
        let expected = match directive {
            DirectiveKind::RetryPrevious | DirectiveKind::Escalate => {
                // Escalate only at the ceiling, RetryPrevious only below it.
                if (directive == DirectiveKind::Escalate) != reached {
                    return Err(PipelineError::RetryCeilingViolated {
                        directive,
                        retry_count,
                        ceiling: self.retry_ceiling,
                    });
                }
                previous.saturating_add(1)
            }
            _ => previous,
        };

        if retry_count != expected {
            return Err(PipelineError::RetryCountMismatch {
                directive,
                expected,
                actual: retry_count,
            });
        }
        Ok(())
    }
}

fn fail(
    run_id: PipelineRunId,
    stage: StageId,
    cause: PipelineError,
    partial_state: PipelineState,
) -> Box<RunFailure> {
    warn!(stage = %stage, error = %cause, "Pipeline run failed");
    Box::new(RunFailure {
        run_id,
        stage,
        cause,
        partial_state,
    })
}
