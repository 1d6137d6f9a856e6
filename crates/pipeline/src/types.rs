//! Shared value types for the pipeline domain.
//!
//! Unlike the identifiers in [`crate::identifiers`], these types carry values
//! with invariants (a retry ceiling is at least one, a step limit is at least
//! one) and participate in engine decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Policy limits
// ---------------------------------------------------------------------------

/// Number of rejected reviews tolerated before Review escalates to Refine.
///
/// The comparison is made against the *post-increment* retry count: with a
/// ceiling of 3, rejections one and two retry Produce and the third escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RetryCeiling(u32);

impl RetryCeiling {
    /// The ceiling used when nothing else is configured.
    pub const DEFAULT: RetryCeiling = RetryCeiling(3);

    /// Creates a [`RetryCeiling`], returning `None` if `value` is zero.
    #[must_use]
    pub fn new(value: u32) -> Option<Self> {
        if value == 0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Returns the underlying integer value.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns `true` if `retry_count` has reached this ceiling.
    pub fn is_reached_by(self, retry_count: u32) -> bool {
        retry_count >= self.0
    }
}

impl Default for RetryCeiling {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for RetryCeiling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------

/// Maximum number of stage invocations a single run may perform.
///
/// Review may escalate to Refine indefinitely if it never approves; the step
/// limit bounds every run regardless of what the generation service returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepLimit(u32);

impl StepLimit {
    /// The limit used when nothing else is configured.
    pub const DEFAULT: StepLimit = StepLimit(25);

    /// Creates a [`StepLimit`], returning `None` if `value` is zero.
    #[must_use]
    pub fn new(value: u32) -> Option<Self> {
        if value == 0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Returns the underlying integer value.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns `true` if `steps` invocations have used up the limit.
    pub fn is_exhausted_by(self, steps: usize) -> bool {
        steps >= self.0 as usize
    }
}

impl Default for StepLimit {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for StepLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
