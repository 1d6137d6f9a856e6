//! The record threaded through every stage of a run.
//!
//! [`PipelineState`] is exclusively owned by the engine for the duration of a
//! run. Stages read it by reference and describe their writes as a
//! [`StateUpdate`]; the engine is the only caller of [`PipelineState::apply`].
//! Each [`StateUpdate`] variant names exactly the fields one stage owns, so a
//! stage cannot express a write outside its ownership.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{DirectiveKind, PipelineError, StageId, Timestamp};

// ---------------------------------------------------------------------------
// Package files
// ---------------------------------------------------------------------------

/// Packaging output keyed by fixed file names.
///
/// Both keys are always present once constructed; values may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageFiles(BTreeMap<String, String>);

impl PackageFiles {
    /// File name of the dependency manifest.
    pub const REQUIREMENTS_TXT: &'static str = "requirements.txt";
    /// File name of the launch script.
    pub const RUN_SH: &'static str = "run.sh";

    /// Creates the package file set from the two file contents.
    pub fn new(requirements_txt: impl Into<String>, run_sh: impl Into<String>) -> Self {
        let mut files = BTreeMap::new();
        files.insert(Self::REQUIREMENTS_TXT.to_owned(), requirements_txt.into());
        files.insert(Self::RUN_SH.to_owned(), run_sh.into());
        Self(files)
    }

    /// Returns the content of `requirements.txt`.
    pub fn requirements_txt(&self) -> &str {
        self.get(Self::REQUIREMENTS_TXT).unwrap_or_default()
    }

    /// Returns the content of `run.sh`.
    pub fn run_sh(&self) -> &str {
        self.get(Self::RUN_SH).unwrap_or_default()
    }

    /// Returns the content stored under `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Iterates over `(file name, content)` pairs in file-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

/// One entry of the audit trail: a single stage invocation and its outcome.
///
/// Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Stage that was invoked.
    pub stage: StageId,
    /// Kind of directive the stage emitted.
    pub directive: DirectiveKind,
    /// Human-readable summary returned by the stage.
    pub message: String,
    /// When the invocation completed.
    pub timestamp: Timestamp,
}

impl AuditEvent {
    /// Creates an event stamped with the current time.
    pub fn new(stage: StageId, directive: DirectiveKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            directive,
            message: message.into(),
            timestamp: Timestamp::now(),
        }
    }

    /// Returns `true` for the notable event recorded when the retry ceiling
    /// was reached and Review escalated to Refine.
    pub fn is_escalation(&self) -> bool {
        self.directive == DirectiveKind::Escalate
    }
}

/// Append-only, insertion-ordered log of [`AuditEvent`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditTrail(Vec<AuditEvent>);

impl AuditTrail {
    /// Appends an event. There is no way to remove or reorder events.
    pub fn push(&mut self, event: AuditEvent) {
        self.0.push(event);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&AuditEvent> {
        self.0.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AuditEvent> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[AuditEvent] {
        &self.0
    }

    /// Number of invocations of `stage` recorded so far.
    pub fn count_of(&self, stage: StageId) -> usize {
        self.0.iter().filter(|e| e.stage == stage).count()
    }
}

impl<'a> IntoIterator for &'a AuditTrail {
    type Item = &'a AuditEvent;
    type IntoIter = std::slice::Iter<'a, AuditEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Field ownership
// ---------------------------------------------------------------------------

/// Fields a stage may declare as prerequisites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    OriginalInput,
    RefinedSpec,
    Artifact,
}

impl std::fmt::Display for StateField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StateField::OriginalInput => "original_input",
            StateField::RefinedSpec => "refined_spec",
            StateField::Artifact => "artifact",
        })
    }
}

/// The writes produced by one stage invocation.
///
/// One variant per stage; each carries exactly the fields that stage owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "stage")]
pub enum StateUpdate {
    /// Refine writes the refined spec and restarts the retry cycle.
    Refined { refined_spec: String },
    Produced { artifact: String },
    /// Review writes its verdict and the retry count it computed.
    Reviewed {
        approved: bool,
        feedback: String,
        retry_count: u32,
    },
    Documented { documentation: String },
    Tested { test_suite: String },
    Packaged { files: PackageFiles },
}

impl StateUpdate {
    /// Returns the stage that owns the fields in this update.
    pub fn owner(&self) -> StageId {
        match self {
            StateUpdate::Refined { .. } => StageId::Refine,
            StateUpdate::Produced { .. } => StageId::Produce,
            StateUpdate::Reviewed { .. } => StageId::Review,
            StateUpdate::Documented { .. } => StageId::Document,
            StateUpdate::Tested { .. } => StageId::Test,
            StateUpdate::Packaged { .. } => StageId::Package,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline state
// ---------------------------------------------------------------------------

/// Accumulated state of one pipeline run.
///
/// Created once per run with every optional field at its zero value. Fields
/// are read through accessors; writes happen only through [`Self::apply`],
/// [`Self::reset_for_escalation`], [`Self::record`] and
/// [`Self::move_cursor`], all of which are driven by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    original_input: String,
    refined_spec: String,
    artifact: String,
    review_feedback: String,
    approved: bool,
    retry_count: u32,
    documentation: String,
    test_suite: String,
    package_files: Option<PackageFiles>,
    audit_trail: AuditTrail,
    current_stage: Option<StageId>,
}

impl PipelineState {
    /// Creates the initial state for a run, positioned at the entry stage.
    pub fn new(original_input: impl Into<String>) -> Self {
        Self {
            original_input: original_input.into(),
            refined_spec: String::new(),
            artifact: String::new(),
            review_feedback: String::new(),
            approved: false,
            retry_count: 0,
            documentation: String::new(),
            test_suite: String::new(),
            package_files: None,
            audit_trail: AuditTrail::default(),
            current_stage: Some(StageId::ENTRY),
        }
    }

    pub fn original_input(&self) -> &str {
        &self.original_input
    }

    pub fn refined_spec(&self) -> &str {
        &self.refined_spec
    }

    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    pub fn review_feedback(&self) -> &str {
        &self.review_feedback
    }

    /// Whether the most recent review approved the artifact.
    pub fn approved(&self) -> bool {
        self.approved
    }

    /// Produce/Review cycles attempted for the current refinement.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn documentation(&self) -> &str {
        &self.documentation
    }

    pub fn test_suite(&self) -> &str {
        &self.test_suite
    }

    /// Packaging output; `None` until Package has run.
    pub fn package_files(&self) -> Option<&PackageFiles> {
        self.package_files.as_ref()
    }

    pub fn audit_trail(&self) -> &AuditTrail {
        &self.audit_trail
    }

    /// The stage the engine will invoke next; `None` once the run has ended.
    pub fn current_stage(&self) -> Option<StageId> {
        self.current_stage
    }

    /// Returns the value of `field`, or a precondition error naming `stage`
    /// if the field is still empty.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Precondition`] when the field is empty.
    pub fn require(&self, stage: StageId, field: StateField) -> Result<&str, PipelineError> {
        let value = match field {
            StateField::OriginalInput => self.original_input.as_str(),
            StateField::RefinedSpec => self.refined_spec.as_str(),
            StateField::Artifact => self.artifact.as_str(),
        };
        if value.trim().is_empty() {
            Err(PipelineError::Precondition { stage, field })
        } else {
            Ok(value)
        }
    }

    /// Applies a stage's writes.
    pub fn apply(&mut self, update: StateUpdate) {
        match update {
            StateUpdate::Refined { refined_spec } => {
                self.refined_spec = refined_spec;
                self.retry_count = 0;
            }
            StateUpdate::Produced { artifact } => self.artifact = artifact,
            StateUpdate::Reviewed {
                approved,
                feedback,
                retry_count,
            } => {
                self.approved = approved;
                self.review_feedback = feedback;
                self.retry_count = retry_count;
            }
            StateUpdate::Documented { documentation } => self.documentation = documentation,
            StateUpdate::Tested { test_suite } => self.test_suite = test_suite,
            StateUpdate::Packaged { files } => self.package_files = Some(files),
        }
    }

    /// Honours an `Escalate` directive: the refinement is being redone, so the
    /// retry cycle restarts and the feedback on the old refinement is dropped.
    ///
    /// `artifact` and `approved` are left as they are; the next Produce
    /// overwrites the artifact unconditionally.
    pub fn reset_for_escalation(&mut self) {
        self.retry_count = 0;
        self.review_feedback.clear();
    }

    /// Appends an audit event.
    pub fn record(&mut self, event: AuditEvent) {
        self.audit_trail.push(event);
    }

    /// Moves the engine cursor to the next stage (`None` ends the run).
    pub fn move_cursor(&mut self, next: Option<StageId>) {
        self.current_stage = next;
    }
}
