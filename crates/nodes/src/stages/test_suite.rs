use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    ContentGenerator, Directive, GenerationContext, PipelineError, PipelineState, Stage, StageId,
    StageOutput, StateField, StateUpdate,
};

use crate::instructions;

/// Writes a test suite for the approved artifact.
pub struct TestStage {
    generator: Arc<dyn ContentGenerator>,
}

impl TestStage {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for TestStage {
    fn id(&self) -> StageId {
        StageId::Test
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError> {
        let spec = state.require(StageId::Test, StateField::RefinedSpec)?;
        let artifact = state.require(StageId::Test, StateField::Artifact)?;

        let context = GenerationContext::default()
            .with_refined_spec(spec)
            .with_artifact(artifact);
        let output = super::generate(
            self.generator.as_ref(),
            &instructions::test_suite(spec, artifact),
            &context,
        )
        .await?;
        let test_suite = super::expect_text(StageId::Test, output)?;

        Ok(StageOutput::new(
            StateUpdate::Tested { test_suite },
            Directive::Proceed(StageId::Package),
            "test cases generated",
        ))
    }
}
