use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    ContentGenerator, Directive, GeneratedOutput, GenerationContext, OutputShape, PackageFiles,
    PipelineError, PipelineState, Stage, StageId, StageOutput, StateField, StateUpdate,
};

use crate::instructions;

/// Produces `requirements.txt` and `run.sh`, then ends the run.
pub struct PackageStage {
    generator: Arc<dyn ContentGenerator>,
}

impl PackageStage {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for PackageStage {
    fn id(&self) -> StageId {
        StageId::Package
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError> {
        let spec = state.require(StageId::Package, StateField::RefinedSpec)?;
        let artifact = state.require(StageId::Package, StateField::Artifact)?;

        let context = GenerationContext::default()
            .with_refined_spec(spec)
            .with_artifact(artifact);
        let output = super::generate(
            self.generator.as_ref(),
            &instructions::package(spec, artifact),
            &context,
        )
        .await?;

        let files = match output {
            GeneratedOutput::Package {
                requirements_txt,
                run_sh,
            } => PackageFiles::new(requirements_txt.trim(), run_sh.trim()),
            other => {
                return Err(super::unexpected_shape(
                    StageId::Package,
                    OutputShape::Package,
                    &other,
                ))
            }
        };

        Ok(StageOutput::new(
            StateUpdate::Packaged { files },
            Directive::Terminate,
            "package files generated",
        ))
    }
}
