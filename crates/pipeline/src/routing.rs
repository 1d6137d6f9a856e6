//! The fixed routing table mapping `(stage, directive kind)` to a target.
//!
//! ```text
//! refine   --proceed-------> produce
//! produce  --proceed-------> review
//! review   --proceed-------> document
//! review   --retry_previous> produce
//! review   --escalate------> refine
//! document --proceed-------> test
//! test     --proceed-------> package
//! package  --terminate-----> (end of run)
//! ```
//!
//! Any pair absent from the table is a [`PipelineError::Routing`]. That is how
//! a stage emitting a directive it is not authorised to emit (for example
//! Produce emitting `Escalate`) is caught.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Directive, DirectiveKind, PipelineError, StageId};

/// Where a resolved directive leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Continue with the given stage.
    Stage(StageId),
    /// The run is complete.
    Terminal,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Stage(stage) => write!(f, "{stage}"),
            Route::Terminal => f.write_str("end"),
        }
    }
}

/// Immutable mapping from `(stage, directive kind)` to a [`Route`].
///
/// Built once at engine construction and only read afterwards, so a single
/// table may be shared by concurrent runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    edges: BTreeMap<(StageId, DirectiveKind), Route>,
}

impl RoutingTable {
    /// Returns the standard six-stage table.
    pub fn standard() -> Self {
        use DirectiveKind::*;
        use StageId::*;

        let edges = [
            ((Refine, Proceed), Route::Stage(Produce)),
            ((Produce, Proceed), Route::Stage(Review)),
            ((Review, Proceed), Route::Stage(Document)),
            ((Review, RetryPrevious), Route::Stage(Produce)),
            ((Review, Escalate), Route::Stage(Refine)),
            ((Document, Proceed), Route::Stage(Test)),
            ((Test, Proceed), Route::Stage(Package)),
            ((Package, Terminate), Route::Terminal),
        ];

        Self {
            edges: edges.into_iter().collect(),
        }
    }

    /// Resolves the directive emitted by `from` into the next route.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Routing`] if the pair has no entry, or if a
    /// `Proceed` hint names a stage other than the table's target.
    pub fn resolve(&self, from: StageId, directive: Directive) -> Result<Route, PipelineError> {
        let kind = directive.kind();
        let route = self
            .edges
            .get(&(from, kind))
            .copied()
            .ok_or(PipelineError::Routing {
                stage: from,
                directive: kind,
            })?;

        match (directive.hint(), route) {
            (Some(hint), Route::Stage(target)) if hint != target => Err(PipelineError::Routing {
                stage: from,
                directive: kind,
            }),
            _ => Ok(route),
        }
    }

    /// Returns `true` if `from` may emit directives of `kind`.
    pub fn allows(&self, from: StageId, kind: DirectiveKind) -> bool {
        self.edges.contains_key(&(from, kind))
    }

    /// Iterates over every edge in `(stage, kind)` order.
    pub fn edges(&self) -> impl Iterator<Item = (StageId, DirectiveKind, Route)> + '_ {
        self.edges
            .iter()
            .map(|(&(stage, kind), &route)| (stage, kind, route))
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_has_eight_edges() {
        assert_eq!(RoutingTable::standard().edges().count(), 8);
    }

    #[test]
    fn review_has_three_outgoing_edges() {
        let table = RoutingTable::standard();
        assert_eq!(
            table.resolve(StageId::Review, Directive::Proceed(StageId::Document)).unwrap(),
            Route::Stage(StageId::Document)
        );
        assert_eq!(
            table.resolve(StageId::Review, Directive::RetryPrevious).unwrap(),
            Route::Stage(StageId::Produce)
        );
        assert_eq!(
            table.resolve(StageId::Review, Directive::Escalate).unwrap(),
            Route::Stage(StageId::Refine)
        );
    }

    #[test]
    fn package_terminates() {
        let table = RoutingTable::standard();
        assert_eq!(
            table.resolve(StageId::Package, Directive::Terminate).unwrap(),
            Route::Terminal
        );
    }

    #[test]
    fn produce_cannot_escalate() {
        let err = RoutingTable::standard()
            .resolve(StageId::Produce, Directive::Escalate)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Routing {
                stage: StageId::Produce,
                directive: DirectiveKind::Escalate
            }
        ));
    }

    #[test]
    fn only_package_may_terminate() {
        let table = RoutingTable::standard();
        for stage in StageId::ALL {
            assert_eq!(
                table.allows(stage, DirectiveKind::Terminate),
                stage == StageId::Package
            );
        }
    }

    #[test]
    fn proceed_hint_must_match_target() {
        let err = RoutingTable::standard()
            .resolve(StageId::Refine, Directive::Proceed(StageId::Review))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Routing { .. }));
    }

    #[test]
    fn every_non_terminal_stage_can_proceed() {
        let table = RoutingTable::standard();
        for stage in StageId::ALL.into_iter().filter(|s| *s != StageId::Package) {
            assert!(table.allows(stage, DirectiveKind::Proceed), "{stage}");
        }
    }
}
