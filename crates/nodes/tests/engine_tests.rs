//! Engine behaviour against a scripted content generator.
//!
//! The scripted generator answers text stages with `"<stage> output #<n>"`,
//! Review with the next queued verdict (approve once the queue is empty) and
//! Package with fixed file contents. Every request is recorded.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nodes::{Engine, RefineStage, RunFailure};
use pipeline::{
    ContentGenerator, Directive, DirectiveKind, GeneratedOutput, GenerationContext,
    GenerationError, Instructions, OutputShape, PipelineError, PipelineState, RetryCeiling, Stage,
    StageId, StageOutput, StateField, StateUpdate, StepLimit,
};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScriptedGenerator {
    verdicts: Mutex<VecDeque<bool>>,
    always_reject: bool,
    fail_on: Option<StageId>,
    calls: Mutex<Vec<(StageId, GenerationContext)>>,
}

impl ScriptedGenerator {
    fn approving() -> Self {
        Self::default()
    }

    fn with_verdicts(verdicts: &[bool]) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.iter().copied().collect()),
            ..Self::default()
        }
    }

    fn rejecting() -> Self {
        Self {
            always_reject: true,
            ..Self::default()
        }
    }

    fn failing_on(stage: StageId) -> Self {
        Self {
            fail_on: Some(stage),
            ..Self::default()
        }
    }

    fn contexts_for(&self, stage: StageId) -> Vec<GenerationContext> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, ctx)| ctx.clone())
            .collect()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        instructions: &Instructions,
        context: &GenerationContext,
    ) -> Result<GeneratedOutput, GenerationError> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((instructions.stage, context.clone()));
            calls.iter().filter(|(s, _)| *s == instructions.stage).count()
        };

        if self.fail_on == Some(instructions.stage) {
            return Err(GenerationError::Status {
                code: 500,
                body: "backend exploded".into(),
                retry_after_secs: None,
            });
        }

        Ok(match instructions.shape {
            OutputShape::Text => {
                GeneratedOutput::text(format!("{} output #{call_number}", instructions.stage))
            }
            OutputShape::Review => {
                let approved = if self.always_reject {
                    false
                } else {
                    self.verdicts.lock().unwrap().pop_front().unwrap_or(true)
                };
                GeneratedOutput::Review {
                    approved,
                    feedback: format!("review #{call_number}"),
                }
            }
            OutputShape::Package => GeneratedOutput::Package {
                requirements_txt: "  \n".into(),
                run_sh: "#!/bin/sh\npython main.py\n".into(),
            },
        })
    }
}

/// A stage that returns a fixed output without calling any generator.
struct FixedStage {
    id: StageId,
    update: StateUpdate,
    directive: Directive,
}

#[async_trait]
impl Stage for FixedStage {
    fn id(&self) -> StageId {
        self.id
    }

    async fn execute(&self, _state: &PipelineState) -> Result<StageOutput, PipelineError> {
        Ok(StageOutput::new(
            self.update.clone(),
            self.directive,
            "fixed output",
        ))
    }
}

/// Wraps the real Refine stage and records what it saw on entry.
struct ObservedRefine {
    inner: RefineStage,
    seen: Arc<Mutex<Vec<(u32, String)>>>,
}

#[async_trait]
impl Stage for ObservedRefine {
    fn id(&self) -> StageId {
        StageId::Refine
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError> {
        self.seen
            .lock()
            .unwrap()
            .push((state.retry_count(), state.review_feedback().to_owned()));
        self.inner.execute(state).await
    }
}

/// Wraps the real Produce stage and cancels the run once it has finished.
struct CancellingProduce {
    inner: nodes::ProduceStage,
    token: CancellationToken,
}

#[async_trait]
impl Stage for CancellingProduce {
    fn id(&self) -> StageId {
        StageId::Produce
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError> {
        let output = self.inner.execute(state).await;
        self.token.cancel();
        output
    }
}

fn engine_with(generator: Arc<ScriptedGenerator>) -> Engine {
    Engine::builder().generator(generator).build().unwrap()
}

fn stage_sequence(state: &PipelineState) -> Vec<StageId> {
    state.audit_trail().iter().map(|e| e.stage).collect()
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn approving_review_reaches_terminate_in_six_steps() {
    let generator = Arc::new(ScriptedGenerator::approving());
    let outcome = engine_with(generator).run("contact book").await.unwrap();

    assert_eq!(outcome.steps(), 6);
    assert_eq!(stage_sequence(&outcome.state), StageId::ALL.to_vec());

    let state = &outcome.state;
    assert_eq!(state.current_stage(), None);
    assert!(state.approved());
    assert_eq!(state.retry_count(), 0);
    assert_eq!(state.refined_spec(), "refine output #1");
    assert_eq!(state.artifact(), "produce output #1");
    assert_eq!(state.documentation(), "document output #1");
    assert_eq!(state.test_suite(), "test output #1");

    let files = state.package_files().expect("package ran");
    assert_eq!(files.requirements_txt(), "");
    assert_eq!(files.run_sh(), "#!/bin/sh\npython main.py");
    assert_eq!(
        state.audit_trail().last().unwrap().directive,
        DirectiveKind::Terminate
    );
}

#[tokio::test]
async fn stages_receive_only_their_context_slice() {
    let generator = Arc::new(ScriptedGenerator::approving());
    engine_with(Arc::clone(&generator))
        .run("contact book")
        .await
        .unwrap();

    let refine = &generator.contexts_for(StageId::Refine)[0];
    assert_eq!(refine.original_input.as_deref(), Some("contact book"));
    assert!(refine.artifact.is_none());

    let produce = &generator.contexts_for(StageId::Produce)[0];
    assert_eq!(produce.refined_spec.as_deref(), Some("refine output #1"));
    assert!(produce.review_feedback.is_none());

    let review = &generator.contexts_for(StageId::Review)[0];
    assert_eq!(review.artifact.as_deref(), Some("produce output #1"));
}

// ---------------------------------------------------------------------------
// Retry and escalation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_rejections_retry_produce_without_reset() {
    let generator = Arc::new(ScriptedGenerator::with_verdicts(&[false, false, true]));
    let outcome = engine_with(Arc::clone(&generator))
        .run("contact book")
        .await
        .unwrap();
    let state = &outcome.state;

    assert_eq!(state.audit_trail().count_of(StageId::Produce), 3);
    assert_eq!(state.audit_trail().count_of(StageId::Refine), 1);
    assert!(state.approved());
    assert_eq!(state.retry_count(), 2);
    assert_eq!(state.artifact(), "produce output #3");
    assert!(!state.audit_trail().iter().any(|e| e.is_escalation()));
    assert_eq!(outcome.steps(), 10);

    // Each retry carries the preceding review's feedback.
    let produce_calls = generator.contexts_for(StageId::Produce);
    assert_eq!(produce_calls[1].review_feedback.as_deref(), Some("review #1"));
    assert_eq!(produce_calls[2].review_feedback.as_deref(), Some("review #2"));
}

#[tokio::test]
async fn third_rejection_escalates_and_resets_the_cycle() {
    let generator = Arc::new(ScriptedGenerator::with_verdicts(&[false, false, false, true]));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let engine = Engine::builder()
        .generator(generator.clone())
        .stage(Box::new(ObservedRefine {
            inner: RefineStage::new(generator.clone()),
            seen: Arc::clone(&seen),
        }))
        .build()
        .unwrap();

    let outcome = engine.run("contact book").await.unwrap();
    let state = &outcome.state;

    use StageId::*;
    assert_eq!(
        stage_sequence(state),
        vec![
            Refine, Produce, Review, Produce, Review, Produce, Review, Refine, Produce, Review,
            Document, Test, Package
        ]
    );

    let escalation = &state.audit_trail().as_slice()[6];
    assert!(escalation.is_escalation());
    assert_eq!(escalation.stage, Review);

    // Second Refine sees the state immediately after escalation.
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1], (0, String::new()));

    // Produce after escalation gets no stale feedback.
    let produce_calls = generator.contexts_for(Produce);
    assert!(produce_calls[3].review_feedback.is_none());
    assert_eq!(produce_calls[3].refined_spec.as_deref(), Some("refine output #2"));

    assert!(state.approved());
    assert_eq!(state.retry_count(), 0);
}

#[tokio::test]
async fn endless_rejection_stops_at_the_step_limit() {
    let generator = Arc::new(ScriptedGenerator::rejecting());
    let engine = Engine::builder()
        .generator(generator)
        .step_limit(StepLimit::new(20).unwrap())
        .build()
        .unwrap();

    let failure = engine.run("contact book").await.unwrap_err();

    assert!(matches!(
        failure.cause,
        PipelineError::StepLimitExceeded { .. }
    ));
    let trail = failure.partial_state.audit_trail();
    assert_eq!(trail.len(), 20);
    // Refine + 3 x (Produce, Review) per cycle.
    assert_eq!(trail.iter().filter(|e| e.is_escalation()).count(), 2);
    assert!(failure.partial_state.retry_count() <= RetryCeiling::DEFAULT.as_u32());
}

#[tokio::test]
async fn custom_ceiling_changes_the_escalation_point() {
    let generator = Arc::new(ScriptedGenerator::with_verdicts(&[false, true]));
    let engine = Engine::builder()
        .generator(generator)
        .retry_ceiling(RetryCeiling::new(1).unwrap())
        .build()
        .unwrap();

    let outcome = engine.run("contact book").await.unwrap();
    assert_eq!(outcome.state.audit_trail().count_of(StageId::Refine), 2);
    assert_eq!(outcome.state.retry_count(), 0);
}

// ---------------------------------------------------------------------------
// Fatal errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generation_failure_keeps_partial_state() {
    let generator = Arc::new(ScriptedGenerator::failing_on(StageId::Produce));
    let failure: Box<RunFailure> = engine_with(generator)
        .run("contact book")
        .await
        .unwrap_err();

    assert_eq!(failure.stage, StageId::Produce);
    assert!(matches!(
        failure.cause,
        PipelineError::Generation {
            stage: StageId::Produce,
            source: GenerationError::Status { code: 500, .. }
        }
    ));
    assert_eq!(failure.partial_state.refined_spec(), "refine output #1");
    assert!(failure.partial_state.artifact().is_empty());
    assert_eq!(failure.partial_state.audit_trail().len(), 1);
}

#[tokio::test]
async fn empty_input_fails_refine_precondition() {
    let generator = Arc::new(ScriptedGenerator::approving());
    let failure = engine_with(Arc::clone(&generator))
        .run("   ")
        .await
        .unwrap_err();

    assert_eq!(failure.stage, StageId::Refine);
    assert!(matches!(
        failure.cause,
        PipelineError::Precondition {
            stage: StageId::Refine,
            field: StateField::OriginalInput
        }
    ));
    assert!(failure.partial_state.audit_trail().is_empty());
    assert!(generator.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unauthorised_directive_is_a_routing_error() {
    let generator = Arc::new(ScriptedGenerator::approving());
    let engine = Engine::builder()
        .generator(generator)
        .stage(Box::new(FixedStage {
            id: StageId::Produce,
            update: StateUpdate::Produced {
                artifact: "code".into(),
            },
            directive: Directive::Escalate,
        }))
        .build()
        .unwrap();

    let failure = engine.run("contact book").await.unwrap_err();

    assert!(matches!(
        failure.cause,
        PipelineError::Routing {
            stage: StageId::Produce,
            directive: DirectiveKind::Escalate
        }
    ));
    // The invocation is audited, but its writes are not applied.
    assert_eq!(failure.partial_state.audit_trail().len(), 2);
    assert!(failure.partial_state.artifact().is_empty());
}

#[tokio::test]
async fn writing_another_stages_fields_is_rejected() {
    let generator = Arc::new(ScriptedGenerator::approving());
    let engine = Engine::builder()
        .generator(generator)
        .stage(Box::new(FixedStage {
            id: StageId::Document,
            update: StateUpdate::Produced {
                artifact: "overwritten".into(),
            },
            directive: Directive::Proceed(StageId::Test),
        }))
        .build()
        .unwrap();

    let failure = engine.run("contact book").await.unwrap_err();

    assert!(matches!(
        failure.cause,
        PipelineError::OwnershipViolation {
            stage: StageId::Document,
            owner: StageId::Produce
        }
    ));
    assert_eq!(failure.partial_state.artifact(), "produce output #1");
}

#[tokio::test]
async fn retry_beyond_the_ceiling_is_rejected() {
    let generator = Arc::new(ScriptedGenerator::approving());
    let engine = Engine::builder()
        .generator(generator)
        .stage(Box::new(FixedStage {
            id: StageId::Review,
            update: StateUpdate::Reviewed {
                approved: false,
                feedback: "again".into(),
                retry_count: 3,
            },
            directive: Directive::RetryPrevious,
        }))
        .build()
        .unwrap();

    let failure = engine.run("contact book").await.unwrap_err();

    assert!(matches!(
        failure.cause,
        PipelineError::RetryCeilingViolated {
            directive: DirectiveKind::RetryPrevious,
            retry_count: 3,
            ..
        }
    ));
    assert_eq!(failure.partial_state.retry_count(), 0);
}

fn engine_with_review(update: StateUpdate, directive: Directive) -> Engine {
    Engine::builder()
        .generator(Arc::new(ScriptedGenerator::approving()))
        .stage(Box::new(FixedStage {
            id: StageId::Review,
            update,
            directive,
        }))
        .build()
        .unwrap()
}

fn reviewed(approved: bool, retry_count: u32) -> StateUpdate {
    StateUpdate::Reviewed {
        approved,
        feedback: "fixed review".into(),
        retry_count,
    }
}

#[tokio::test]
async fn approval_must_not_change_the_retry_count() {
    let engine = engine_with_review(reviewed(true, 7), Directive::Proceed(StageId::Document));

    let failure = engine.run("contact book").await.unwrap_err();

    assert_eq!(
        failure.cause,
        PipelineError::RetryCountMismatch {
            directive: DirectiveKind::Proceed,
            expected: 0,
            actual: 7
        }
    );
    assert_eq!(failure.stage, StageId::Review);
    assert_eq!(failure.partial_state.retry_count(), 0);
    assert!(!failure.partial_state.approved());
}

#[tokio::test]
async fn retry_must_increment_the_count() {
    let engine = engine_with_review(reviewed(false, 0), Directive::RetryPrevious);

    let failure = engine.run("contact book").await.unwrap_err();

    assert_eq!(
        failure.cause,
        PipelineError::RetryCountMismatch {
            directive: DirectiveKind::RetryPrevious,
            expected: 1,
            actual: 0
        }
    );
    // Fails on the first review instead of cycling until the step limit.
    assert_eq!(failure.partial_state.audit_trail().len(), 3);
}

#[tokio::test]
async fn repeated_retry_count_fails_on_the_second_review() {
    let engine = engine_with_review(reviewed(false, 1), Directive::RetryPrevious);

    let failure = engine.run("contact book").await.unwrap_err();

    assert_eq!(
        failure.cause,
        PipelineError::RetryCountMismatch {
            directive: DirectiveKind::RetryPrevious,
            expected: 2,
            actual: 1
        }
    );
    assert_eq!(failure.partial_state.audit_trail().count_of(StageId::Review), 2);
    assert_eq!(failure.partial_state.retry_count(), 1);
}

#[tokio::test]
async fn escalation_below_the_ceiling_is_rejected() {
    let engine = engine_with_review(reviewed(false, 1), Directive::Escalate);

    let failure = engine.run("contact book").await.unwrap_err();

    assert!(matches!(
        failure.cause,
        PipelineError::RetryCeilingViolated {
            directive: DirectiveKind::Escalate,
            retry_count: 1,
            ..
        }
    ));
    assert!(failure.partial_state.review_feedback().is_empty());
}

#[tokio::test]
async fn escalation_must_follow_from_the_previous_count() {
    let engine = engine_with_review(reviewed(false, 3), Directive::Escalate);

    let failure = engine.run("contact book").await.unwrap_err();

    assert_eq!(
        failure.cause,
        PipelineError::RetryCountMismatch {
            directive: DirectiveKind::Escalate,
            expected: 1,
            actual: 3
        }
    );
}

// ---------------------------------------------------------------------------
// Cancellation and construction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_token_stops_before_first_stage() {
    let generator = Arc::new(ScriptedGenerator::approving());
    let token = CancellationToken::new();
    token.cancel();

    let failure = engine_with(generator)
        .run_with_cancellation("contact book", &token)
        .await
        .unwrap_err();

    assert_eq!(
        failure.cause,
        PipelineError::Cancelled {
            next: StageId::Refine
        }
    );
    assert!(failure.partial_state.audit_trail().is_empty());
}

#[tokio::test]
async fn cancellation_takes_effect_at_the_next_checkpoint() {
    let generator = Arc::new(ScriptedGenerator::approving());
    let token = CancellationToken::new();
    let engine = Engine::builder()
        .generator(generator.clone())
        .stage(Box::new(CancellingProduce {
            inner: nodes::ProduceStage::new(generator),
            token: token.clone(),
        }))
        .build()
        .unwrap();

    let failure = engine
        .run_with_cancellation("contact book", &token)
        .await
        .unwrap_err();

    assert_eq!(failure.stage, StageId::Review);
    // The in-flight Produce completed and its write was kept.
    assert_eq!(failure.partial_state.artifact(), "produce output #1");
    assert_eq!(failure.partial_state.audit_trail().len(), 2);
}

#[test]
fn builder_without_generator_reports_missing_stages() {
    let err = Engine::builder()
        .stage(Box::new(FixedStage {
            id: StageId::Package,
            update: StateUpdate::Tested {
                test_suite: String::new(),
            },
            directive: Directive::Terminate,
        }))
        .build()
        .unwrap_err();

    match err {
        PipelineError::Configuration { message } => {
            assert!(message.contains("refine"));
            assert!(!message.contains("package"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn one_engine_serves_concurrent_runs() {
    let engine = Arc::new(engine_with(Arc::new(ScriptedGenerator::approving())));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run(format!("task {i}")).await })
        })
        .collect();

    let mut run_ids = HashSet::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.steps(), 6);
        run_ids.insert(outcome.run_id);
    }
    assert_eq!(run_ids.len(), 4);
}

#[tokio::test]
async fn identical_scripts_give_identical_runs() {
    let script = [false, false, false, false, true];
    let first = engine_with(Arc::new(ScriptedGenerator::with_verdicts(&script)))
        .run("contact book")
        .await
        .unwrap();
    let second = engine_with(Arc::new(ScriptedGenerator::with_verdicts(&script)))
        .run("contact book")
        .await
        .unwrap();

    let decisions = |state: &PipelineState| -> Vec<(StageId, DirectiveKind)> {
        state
            .audit_trail()
            .iter()
            .map(|e| (e.stage, e.directive))
            .collect()
    };
    assert_eq!(decisions(&first.state), decisions(&second.state));
    assert_eq!(first.state.artifact(), second.state.artifact());
    assert_eq!(first.state.retry_count(), second.state.retry_count());
}
