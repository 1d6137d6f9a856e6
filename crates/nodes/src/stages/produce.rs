use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    ContentGenerator, Directive, GenerationContext, PipelineError, PipelineState, Stage, StageId,
    StageOutput, StateField, StateUpdate,
};

use crate::instructions;

/// Produces the primary artifact from the refined specification.
///
/// On a retry the previous review's feedback is sent along. The old artifact
/// is never sent: it is overwritten unconditionally.
pub struct ProduceStage {
    generator: Arc<dyn ContentGenerator>,
}

impl ProduceStage {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for ProduceStage {
    fn id(&self) -> StageId {
        StageId::Produce
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError> {
        let spec = state.require(StageId::Produce, StateField::RefinedSpec)?;
        let feedback = state.review_feedback();

        let context = GenerationContext::default()
            .with_refined_spec(spec)
            .with_review_feedback(feedback);
        let output = super::generate(
            self.generator.as_ref(),
            &instructions::produce(spec, feedback),
            &context,
        )
        .await?;
        let artifact = super::expect_text(StageId::Produce, output)?;

        let summary = if feedback.trim().is_empty() {
            "artifact produced"
        } else {
            "artifact reworked from review feedback"
        };
        Ok(StageOutput::new(
            StateUpdate::Produced { artifact },
            Directive::Proceed(StageId::Review),
            summary,
        ))
    }
}
