use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    ContentGenerator, Directive, GenerationContext, PipelineError, PipelineState, Stage, StageId,
    StageOutput, StateField, StateUpdate,
};

use crate::instructions;

/// Writes documentation for the approved artifact.
pub struct DocumentStage {
    generator: Arc<dyn ContentGenerator>,
}

impl DocumentStage {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for DocumentStage {
    fn id(&self) -> StageId {
        StageId::Document
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError> {
        let spec = state.require(StageId::Document, StateField::RefinedSpec)?;
        let artifact = state.require(StageId::Document, StateField::Artifact)?;

        let context = GenerationContext::default()
            .with_refined_spec(spec)
            .with_artifact(artifact);
        let output = super::generate(
            self.generator.as_ref(),
            &instructions::document(spec, artifact),
            &context,
        )
        .await?;
        let documentation = super::expect_text(StageId::Document, output)?;

        Ok(StageOutput::new(
            StateUpdate::Documented { documentation },
            Directive::Proceed(StageId::Test),
            "documentation generated",
        ))
    }
}
