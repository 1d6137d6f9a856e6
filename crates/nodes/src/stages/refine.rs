use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    ContentGenerator, Directive, GenerationContext, PipelineError, PipelineState, Stage, StageId,
    StageOutput, StateField, StateUpdate,
};

use crate::instructions;

/// Refines the original task description into a structured specification.
///
/// Writes `refined_spec`; applying its update also restarts the retry cycle.
pub struct RefineStage {
    generator: Arc<dyn ContentGenerator>,
}

impl RefineStage {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for RefineStage {
    fn id(&self) -> StageId {
        StageId::Refine
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError> {
        let input = state.require(StageId::Refine, StateField::OriginalInput)?;

        let context = GenerationContext::default().with_original_input(input);
        let output =
            super::generate(self.generator.as_ref(), &instructions::refine(input), &context).await?;
        let refined_spec = super::expect_text(StageId::Refine, output)?;

        Ok(StageOutput::new(
            StateUpdate::Refined { refined_spec },
            Directive::Proceed(StageId::Produce),
            "requirement refined",
        ))
    }
}
