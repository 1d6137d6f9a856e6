//! The stage contract.
//!
//! A [`Stage`] reads the pipeline state, calls the content generator exactly
//! once, and returns a [`StageOutput`]: the writes it wants applied plus the
//! directive telling the engine where to go next. Stages perform no other side
//! effects; in particular they do not log. The engine does that.

use async_trait::async_trait;

use crate::{Directive, PipelineError, PipelineState, StageId, StateUpdate};

/// Result of one stage execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    /// Writes to apply to the state; must be owned by the executing stage.
    pub update: StateUpdate,
    /// Routing directive, validated against the routing table.
    pub directive: Directive,
    /// One-line summary recorded in the audit trail.
    pub summary: String,
}

impl StageOutput {
    pub fn new(update: StateUpdate, directive: Directive, summary: impl Into<String>) -> Self {
        Self {
            update,
            directive,
            summary: summary.into(),
        }
    }
}

/// A unit of work in the pipeline.
///
/// Implementations must be `Send + Sync`: the stage registry is shared
/// read-only by every run of an engine.
#[async_trait]
pub trait Stage: Send + Sync {
    /// The identifier this stage is registered under.
    fn id(&self) -> StageId;

    /// Executes the stage against `state`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Precondition`] if a prerequisite field is empty.
    /// - [`PipelineError::Generation`] if the generator fails or returns
    ///   output of the wrong shape. Not retried.
    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError>;
}
