//! Human-readable rendering of a run: per-stage progress and the final report.

use std::fmt;
use std::path::Path;

use pipeline::{AuditTrail, DirectiveKind, PackageFiles, PipelineState};

const RULE: &str = "====================================================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------------------------------------------";

/// One progress line per audit event, e.g. `[ 3] review    -> retry_previous: ...`.
pub struct Progress<'a>(pub &'a AuditTrail);

impl fmt::Display for Progress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, event) in self.0.iter().enumerate() {
            let marker = if event.directive == DirectiveKind::Escalate {
                " (!)"
            } else {
                ""
            };
            writeln!(
                f,
                "[{:>2}] {:<9} -> {}: {}{marker}",
                index + 1,
                event.stage.as_str(),
                event.directive,
                event.message
            )?;
        }
        Ok(())
    }
}

/// The full report for a final or partial state.
pub struct Report<'a> {
    pub state: &'a PipelineState,
    /// Set when the run failed; printed in the summary.
    pub failure: Option<String>,
}

impl<'a> Report<'a> {
    pub fn new(state: &'a PipelineState) -> Self {
        Self {
            state,
            failure: None,
        }
    }

    pub fn failed(state: &'a PipelineState, failure: impl Into<String>) -> Self {
        Self {
            state,
            failure: Some(failure.into()),
        }
    }

    /// Writes the rendered report to `path`.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_string())
    }
}

fn line_count(text: &str) -> usize {
    text.lines().count()
}

fn section(f: &mut fmt::Formatter<'_>, title: &str, body: &str, empty: &str) -> fmt::Result {
    writeln!(f, "\n{RULE}\n{title}\n{RULE}")?;
    if body.trim().is_empty() {
        writeln!(f, "{empty}")
    } else {
        writeln!(f, "{}", body.trim_end())
    }
}

fn package_section(f: &mut fmt::Formatter<'_>, files: Option<&PackageFiles>) -> fmt::Result {
    writeln!(f, "\n{RULE}\nPACKAGE FILES\n{RULE}")?;
    let Some(files) = files else {
        return writeln!(f, "No package files were generated");
    };

    for (name, content) in files.iter() {
        writeln!(f, "\n--- File: {name} ---")?;
        if !content.trim().is_empty() {
            writeln!(f, "{content}")?;
        } else if name == PackageFiles::REQUIREMENTS_TXT {
            writeln!(f, "# No external dependencies required")?;
        } else {
            writeln!(f, "# No deployment script generated")?;
        }
    }
    Ok(())
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state;

        writeln!(f, "{RULE}\nDEVFLOW PIPELINE REPORT\n{RULE}")?;
        writeln!(f, "\nEXECUTION SUMMARY\n{THIN_RULE}")?;
        if let Some(failure) = &self.failure {
            writeln!(f, "Run Status:           FAILED ({failure})")?;
        }
        writeln!(f, "Stage Invocations:    {}", state.audit_trail().len())?;
        writeln!(f, "Review Iterations:    {}", state.retry_count())?;
        writeln!(
            f,
            "Artifact Status:      {}",
            if state.approved() { "Approved" } else { "Not Approved" }
        )?;
        writeln!(f, "Artifact Size:        {} lines", line_count(state.artifact()))?;
        writeln!(f, "Documentation Size:   {} lines", line_count(state.documentation()))?;
        writeln!(f, "Test Suite Size:      {} lines", line_count(state.test_suite()))?;

        section(f, "REFINED REQUIREMENT", state.refined_spec(), "Not generated")?;
        section(f, "ARTIFACT", state.artifact(), "No artifact was generated")?;
        if !state.review_feedback().trim().is_empty() {
            section(f, "REVIEW FEEDBACK", state.review_feedback(), "")?;
        }
        section(
            f,
            "DOCUMENTATION",
            state.documentation(),
            "No documentation was generated",
        )?;
        section(f, "TEST SUITE", state.test_suite(), "No test cases were generated")?;
        package_section(f, state.package_files())?;

        writeln!(f, "\n{RULE}\nAUDIT TRAIL\n{RULE}")?;
        write!(f, "{}", Progress(state.audit_trail()))?;
        writeln!(f, "\n{RULE}\nEND OF REPORT\n{RULE}")
    }
}
