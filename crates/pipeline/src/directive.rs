//! Routing directives emitted by stages.
//!
//! A stage never names the next stage by string. It returns a [`Directive`],
//! and the [`crate::RoutingTable`] decides whether that directive is legal for
//! the stage and where it leads.

use serde::{Deserialize, Serialize};

use crate::StageId;

/// What a stage asks the engine to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "next")]
pub enum Directive {
    /// Continue forward. The hint names the stage the emitter expects next and
    /// must agree with the routing table.
    Proceed(StageId),
    /// Run the previous producing stage again (Review only).
    RetryPrevious,
    /// Redo the refinement (Review only, once the retry ceiling is reached).
    Escalate,
    /// End the run (Package only).
    Terminate,
}

impl Directive {
    /// Returns the payload-free kind used as the routing table key.
    pub fn kind(self) -> DirectiveKind {
        match self {
            Directive::Proceed(_) => DirectiveKind::Proceed,
            Directive::RetryPrevious => DirectiveKind::RetryPrevious,
            Directive::Escalate => DirectiveKind::Escalate,
            Directive::Terminate => DirectiveKind::Terminate,
        }
    }

    /// Returns the next-stage hint carried by [`Directive::Proceed`].
    pub fn hint(self) -> Option<StageId> {
        match self {
            Directive::Proceed(next) => Some(next),
            _ => None,
        }
    }
}

/// The kind of a [`Directive`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    Proceed,
    RetryPrevious,
    Escalate,
    Terminate,
}

impl DirectiveKind {
    /// Returns the stable snake_case name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            DirectiveKind::Proceed => "proceed",
            DirectiveKind::RetryPrevious => "retry_previous",
            DirectiveKind::Escalate => "escalate",
            DirectiveKind::Terminate => "terminate",
        }
    }
}

impl std::fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
