//! The six default stage implementations.
//!
//! Each stage checks its prerequisites, renders its instructions, calls the
//! generator once and turns the answer into a [`pipeline::StateUpdate`]. The
//! only stage with branching logic is [`ReviewStage`].

mod document;
mod package;
mod produce;
mod refine;
mod review;
mod test_suite;

use std::sync::Arc;

use pipeline::{
    ContentGenerator, GeneratedOutput, GenerationContext, GenerationError, Instructions,
    OutputShape, PipelineError, RetryCeiling, Stage, StageId,
};

pub use document::DocumentStage;
pub use package::PackageStage;
pub use produce::ProduceStage;
pub use refine::RefineStage;
pub use review::{ReviewOutcome, ReviewStage};
pub use test_suite::TestStage;

/// Builds the default stage for `id`, backed by `generator`.
pub fn default_stage(
    id: StageId,
    generator: Arc<dyn ContentGenerator>,
    ceiling: RetryCeiling,
) -> Box<dyn Stage> {
    match id {
        StageId::Refine => Box::new(RefineStage::new(generator)),
        StageId::Produce => Box::new(ProduceStage::new(generator)),
        StageId::Review => Box::new(ReviewStage::new(generator, ceiling)),
        StageId::Document => Box::new(DocumentStage::new(generator)),
        StageId::Test => Box::new(TestStage::new(generator)),
        StageId::Package => Box::new(PackageStage::new(generator)),
    }
}

/// Calls the generator and attributes any failure to the calling stage.
async fn generate(
    generator: &dyn ContentGenerator,
    instructions: &Instructions,
    context: &GenerationContext,
) -> Result<GeneratedOutput, PipelineError> {
    generator
        .generate(instructions, context)
        .await
        .map_err(|source| PipelineError::Generation {
            stage: instructions.stage,
            source,
        })
}

/// Unwraps free-text output, rejecting any structured shape.
fn expect_text(stage: StageId, output: GeneratedOutput) -> Result<String, PipelineError> {
    match output {
        GeneratedOutput::Text { content } => Ok(content),
        other => Err(unexpected_shape(stage, OutputShape::Text, &other)),
    }
}

fn unexpected_shape(stage: StageId, expected: OutputShape, actual: &GeneratedOutput) -> PipelineError {
    PipelineError::Generation {
        stage,
        source: GenerationError::UnexpectedShape {
            expected,
            actual: actual.shape(),
        },
    }
}
