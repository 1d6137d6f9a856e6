use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    ContentGenerator, Directive, GeneratedOutput, GenerationContext, OutputShape, PipelineError,
    PipelineState, RetryCeiling, Stage, StageId, StageOutput, StateField, StateUpdate,
};

use crate::instructions;

/// The three possible results of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// The artifact passed; the retry loop ends.
    Approved,
    /// Rejected, but the ceiling is not reached: Produce runs again.
    RejectedRetry,
    /// Rejected for the ceiling-th time: the refinement is redone.
    RejectedEscalate,
}

impl ReviewOutcome {
    /// Classifies a verdict given the retry count *before* this review.
    ///
    /// Rejections increment the count first and compare the new value against
    /// the ceiling, so with a ceiling of 3 the third rejection escalates.
    pub fn classify(approved: bool, retry_count: u32, ceiling: RetryCeiling) -> (Self, u32) {
        if approved {
            return (ReviewOutcome::Approved, retry_count);
        }
        let attempts = retry_count + 1;
        if ceiling.is_reached_by(attempts) {
            (ReviewOutcome::RejectedEscalate, attempts)
        } else {
            (ReviewOutcome::RejectedRetry, attempts)
        }
    }
}

/// Evaluates the artifact against the refined specification.
pub struct ReviewStage {
    generator: Arc<dyn ContentGenerator>,
    ceiling: RetryCeiling,
}

impl ReviewStage {
    pub fn new(generator: Arc<dyn ContentGenerator>, ceiling: RetryCeiling) -> Self {
        Self { generator, ceiling }
    }

    /// Turns a verdict into the stage output for a state at `retry_count`.
    pub fn decide(&self, approved: bool, feedback: String, retry_count: u32) -> StageOutput {
        let (outcome, retry_count) = ReviewOutcome::classify(approved, retry_count, self.ceiling);
        let update = StateUpdate::Reviewed {
            approved,
            feedback,
            retry_count,
        };

        match outcome {
            ReviewOutcome::Approved => StageOutput::new(
                update,
                Directive::Proceed(StageId::Document),
                "artifact approved",
            ),
            ReviewOutcome::RejectedRetry => StageOutput::new(
                update,
                Directive::RetryPrevious,
                format!("issues found (attempt {retry_count}), retrying produce"),
            ),
            ReviewOutcome::RejectedEscalate => StageOutput::new(
                update,
                Directive::Escalate,
                format!(
                    "retry ceiling of {} reached, revisiting refinement",
                    self.ceiling
                ),
            ),
        }
    }
}

#[async_trait]
impl Stage for ReviewStage {
    fn id(&self) -> StageId {
        StageId::Review
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError> {
        let spec = state.require(StageId::Review, StateField::RefinedSpec)?;
        let artifact = state.require(StageId::Review, StateField::Artifact)?;

        let context = GenerationContext::default()
            .with_refined_spec(spec)
            .with_artifact(artifact);
        let output = super::generate(
            self.generator.as_ref(),
            &instructions::review(spec, artifact),
            &context,
        )
        .await?;

        match output {
            GeneratedOutput::Review { approved, feedback } => {
                Ok(self.decide(approved, feedback, state.retry_count()))
            }
            other => Err(super::unexpected_shape(
                StageId::Review,
                OutputShape::Review,
                &other,
            )),
        }
    }
}
