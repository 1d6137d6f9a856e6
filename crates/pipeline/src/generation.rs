//! Port to the external content generation service.
//!
//! Every stage delegates its actual transformation to a [`ContentGenerator`].
//! The engine does not know or care how output is produced; it only sees the
//! [`GeneratedOutput`] a stage turns into a [`crate::StateUpdate`].
//!
//! ## Architectural Layer
//!
//! **Port definition.** Implementations live in infrastructure crates (`llm`)
//! or in test code (scripted stubs).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{RetryPolicy, StageId};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// The shape of output a stage expects back from the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    /// Free text (Refine, Produce, Document, Test).
    Text,
    /// An `{approved, feedback}` verdict (Review).
    Review,
    /// A `{requirements_txt, run_sh}` pair (Package).
    Package,
}

impl std::fmt::Display for OutputShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OutputShape::Text => "text",
            OutputShape::Review => "review",
            OutputShape::Package => "package",
        })
    }
}

/// Identifies the behaviour a stage requires from the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructions {
    /// Stage issuing the request.
    pub stage: StageId,
    /// Output shape the stage will accept.
    pub shape: OutputShape,
    /// Fully rendered instruction text.
    pub text: String,
}

/// The slice of pipeline state a stage sends along with its instructions.
///
/// Fields the stage does not use are left `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationContext {
    pub original_input: Option<String>,
    pub refined_spec: Option<String>,
    pub artifact: Option<String>,
    pub review_feedback: Option<String>,
}

impl GenerationContext {
    pub fn with_original_input(mut self, value: impl Into<String>) -> Self {
        self.original_input = Some(value.into());
        self
    }

    pub fn with_refined_spec(mut self, value: impl Into<String>) -> Self {
        self.refined_spec = Some(value.into());
        self
    }

    pub fn with_artifact(mut self, value: impl Into<String>) -> Self {
        self.artifact = Some(value.into());
        self
    }

    /// Adds review feedback, skipping it when blank.
    pub fn with_review_feedback(mut self, value: &str) -> Self {
        if !value.trim().is_empty() {
            self.review_feedback = Some(value.to_owned());
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Output returned by the generator, shaped per [`OutputShape`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "shape")]
pub enum GeneratedOutput {
    Text { content: String },
    Review { approved: bool, feedback: String },
    Package { requirements_txt: String, run_sh: String },
}

impl GeneratedOutput {
    /// Convenience constructor for free-text output.
    pub fn text(content: impl Into<String>) -> Self {
        GeneratedOutput::Text {
            content: content.into(),
        }
    }

    /// Returns the shape of this output.
    pub fn shape(&self) -> OutputShape {
        match self {
            GeneratedOutput::Text { .. } => OutputShape::Text,
            GeneratedOutput::Review { .. } => OutputShape::Review,
            GeneratedOutput::Package { .. } => OutputShape::Package,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of the generation service, or output that cannot satisfy the
/// requesting stage's contract.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationError {
    /// The request never produced a response (connection, timeout, TLS).
    #[error("Transport failure: {message}")]
    Transport {
        message: String,
        /// `true` for timeouts and connection resets.
        transient: bool,
    },

    /// The service answered with a non-success status.
    #[error("Service returned status {code}: {body}")]
    Status {
        code: u16,
        body: String,
        /// Delay requested by the service (`Retry-After`), in seconds.
        retry_after_secs: Option<u64>,
    },

    /// The response could not be parsed into the requested shape.
    #[error("Malformed output: {reason}")]
    Malformed { reason: String },

    /// The generator returned a well-formed output of the wrong shape.
    #[error("Expected {expected} output, got {actual}")]
    UnexpectedShape {
        expected: OutputShape,
        actual: OutputShape,
    },

    /// The generator is not usable (missing credentials, exhausted script).
    #[error("Generator unavailable: {reason}")]
    Unavailable { reason: String },
}

impl GenerationError {
    /// Whether the generator's own retry loop may re-issue the request.
    ///
    /// The engine never retries; this is consulted only inside generator
    /// implementations.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            GenerationError::Transport {
                transient: true, ..
            } => RetryPolicy::Retryable { after: None },
            GenerationError::Status {
                code,
                retry_after_secs,
                ..
            } if *code == 429 || (500..600).contains(code) => RetryPolicy::Retryable {
                after: retry_after_secs.map(Duration::from_secs),
            },
            _ => RetryPolicy::NonRetryable,
        }
    }
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// The external content generation service.
///
/// Called exactly once per stage execution. The call is awaited to completion
/// before the engine moves on; cancellation of an in-flight call is the
/// implementation's own concern.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Produces output for `instructions` given the state slice in `context`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError`] when the service fails or its output does
    /// not match `instructions.shape`.
    async fn generate(
        &self,
        instructions: &Instructions,
        context: &GenerationContext,
    ) -> Result<GeneratedOutput, GenerationError>;
}
