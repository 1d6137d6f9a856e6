//! Domain identifiers.
//!
//! The set of stages is closed, so [`StageId`] is an enum rather than a
//! string-backed newtype: a route to a stage that does not exist cannot be
//! expressed. Run identifiers are UUID-backed and generated per invocation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Stage identifiers
// ---------------------------------------------------------------------------

/// Identifies one of the six stages of the content-production pipeline.
///
/// The declaration order is the nominal execution order; the actual order of
/// a run is decided by the [`crate::RoutingTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Turns the raw task description into a structured specification.
    Refine,
    /// Produces the primary artifact from the refined specification.
    Produce,
    /// Evaluates the artifact and decides whether to proceed, retry or escalate.
    Review,
    /// Writes documentation for the approved artifact.
    Document,
    /// Writes a test suite for the approved artifact.
    Test,
    /// Produces the packaging files (`requirements.txt`, `run.sh`).
    Package,
}

impl StageId {
    /// Every stage, in nominal execution order.
    pub const ALL: [StageId; 6] = [
        StageId::Refine,
        StageId::Produce,
        StageId::Review,
        StageId::Document,
        StageId::Test,
        StageId::Package,
    ];

    /// The stage every run starts from.
    pub const ENTRY: StageId = StageId::Refine;

    /// Returns the stable lowercase name of the stage.
    pub fn as_str(self) -> &'static str {
        match self {
            StageId::Refine => "refine",
            StageId::Produce => "produce",
            StageId::Review => "review",
            StageId::Document => "document",
            StageId::Test => "test",
            StageId::Package => "package",
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Run identifiers
// ---------------------------------------------------------------------------

/// Identifies a single pipeline execution run (one call to `Engine::run`).
///
/// Generated fresh for every run; recorded on the run span and on the run
/// outcome so all activity from a single run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineRunId(Uuid);

impl PipelineRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`PipelineRunId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for PipelineRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
