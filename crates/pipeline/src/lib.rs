//! Core orchestration domain for devflow.
//!
//! This crate contains every domain concept, identifier, value type, port
//! trait and error type used by the content-production pipeline. Infrastructure
//! crates implement the traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | `StageId`, `PipelineRunId` |
//! | [`types`] | `RetryCeiling`, `StepLimit`, `Timestamp` |
//! | [`state`] | `PipelineState`, `StateUpdate`, `AuditTrail`, `PackageFiles` |
//! | [`directive`] | `Directive`, `DirectiveKind` |
//! | [`routing`] | `RoutingTable`, `Route` |
//! | [`stage`] | The `Stage` trait |
//! | [`generation`] | The `ContentGenerator` port and its request/response types |
//! | [`errors`] | `PipelineError`, `RetryPolicy` |

pub mod directive;
pub mod errors;
pub mod generation;
pub mod identifiers;
pub mod routing;
pub mod stage;
pub mod state;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use directive::{Directive, DirectiveKind};
pub use errors::{PipelineError, RetryPolicy};
pub use generation::{
    ContentGenerator, GeneratedOutput, GenerationContext, GenerationError, Instructions,
    OutputShape,
};
pub use identifiers::{PipelineRunId, StageId};
pub use routing::{Route, RoutingTable};
pub use stage::{Stage, StageOutput};
pub use state::{AuditEvent, AuditTrail, PackageFiles, PipelineState, StateField, StateUpdate};
pub use types::{RetryCeiling, StepLimit, Timestamp};
