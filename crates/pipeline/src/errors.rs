//! Top-level error and retry-policy types for the pipeline domain.
//!
//! [`PipelineError`] covers every condition that halts a run. All of them are
//! fatal: the engine stops immediately and hands the partial state back to the
//! caller. Reaching the retry ceiling is *not* an error; it is the normal
//! trigger for an `Escalate` directive and is only recorded in the audit trail.
//!
//! [`RetryPolicy`] is consulted by generator implementations for their own
//! internal retries. The engine itself never retries anything.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DirectiveKind, GenerationError, RetryCeiling, StageId, StateField, StepLimit};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// - `Retryable` errors: timeouts, throttling, server-side failures.
/// - `NonRetryable` errors: rejected credentials, malformed output, bad requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Pipeline-level errors
// ---------------------------------------------------------------------------

/// Errors that halt a pipeline run.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum PipelineError {
    /// A stage was invoked with a required field still empty.
    #[error("Stage '{stage}' requires '{field}' to be populated")]
    Precondition {
        /// Stage whose prerequisite was missing.
        stage: StageId,
        /// The missing field.
        field: StateField,
    },

    /// The generation service failed or returned unusable output.
    #[error("Generation failed in stage '{stage}': {source}")]
    Generation {
        /// Stage whose generation call failed.
        stage: StageId,
        /// Underlying generator failure.
        source: GenerationError,
    },

    /// A stage emitted a directive that has no route from that stage.
    ///
    /// Always a defect in the stage implementation.
    #[error("Stage '{stage}' emitted '{directive}', which has no route")]
    Routing {
        stage: StageId,
        directive: DirectiveKind,
    },

    /// A stage returned writes for fields owned by another stage.
    #[error("Stage '{stage}' attempted to write fields owned by '{owner}'")]
    OwnershipViolation { stage: StageId, owner: StageId },

    /// Review retried at or past the ceiling, or escalated before reaching it.
    #[error("Review emitted '{directive}' at retry count {retry_count}, ceiling is {ceiling}")]
    RetryCeilingViolated {
        directive: DirectiveKind,
        retry_count: u32,
        ceiling: RetryCeiling,
    },

    /// Review reported a retry count that does not follow from the previous
    /// one: rejections add exactly one, approvals leave it unchanged.
    #[error("Review emitted '{directive}' with retry count {actual}, expected {expected}")]
    RetryCountMismatch {
        directive: DirectiveKind,
        expected: u32,
        actual: u32,
    },

    /// The run performed as many stage invocations as it is allowed.
    #[error("Run reached the step limit of {limit} stage invocations")]
    StepLimitExceeded { limit: StepLimit },

    /// The run was cancelled at a checkpoint before `next` started.
    #[error("Run cancelled before stage '{next}'")]
    Cancelled { next: StageId },

    /// The engine could not be built from the supplied parts.
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}
