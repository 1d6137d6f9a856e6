//! Instruction templates sent to the content generator, one per stage.
//!
//! Templates use `{placeholder}` markers that are substituted with the slice
//! of state each stage is allowed to send. Wording here can change freely;
//! the engine never inspects it.

use pipeline::{Instructions, OutputShape, StageId};

const REFINE_TEMPLATE: &str = "\
You turn an informal request into a precise, implementation-ready requirement \
for a coding stage that will consume it verbatim.

Write requirement text only, no code. Use short sections and bullet points.
1. State the purpose of the program in one sentence.
2. List every supported operation; each must map to a concrete function or method.
3. For every operation give inputs with types and constraints, outputs, and error handling.
4. Record assumptions and non-goals. Keep the scope minimal and in-memory.
5. Do not invent features the request does not ask for. Resolve ambiguity with a
   documented assumption instead of widening scope.

Request:
{original_input}
";

const PRODUCE_TEMPLATE: &str = "\
You write a single self-contained Python file that implements the requirement \
below exactly.

- Implement every listed operation, nothing more.
- Validate inputs and handle errors as the requirement describes.
- Give every public function and class a docstring.
- Use only the standard library.
- Output code only, without surrounding explanation.

Requirement:
{refined_spec}
{review_feedback_block}";

const REVIEW_TEMPLATE: &str = "\
You review code against its requirement and decide whether it is acceptable.

Approve when every listed operation is implemented, inputs are validated as \
required, and there are no correctness or safety defects. Style preferences \
alone are not a reason to reject. When rejecting, list the concrete changes \
needed so the author can fix them in one pass.

Respond with `approved` (boolean) and `feedback` (string).

Requirement:
{refined_spec}

Code:
{artifact}
";

const DOCUMENT_TEMPLATE: &str = "\
You write user-facing Markdown documentation for the code below: an overview, \
how to run it, each public operation with its inputs, outputs and errors, and a \
short usage example. Describe only behaviour the code actually has.

Requirement:
{refined_spec}

Code:
{artifact}
";

const TEST_TEMPLATE: &str = "\
You write a pytest test module for the code below. Cover every operation in \
the requirement with at least one success case and one failure case, plus an \
integration test that chains several operations. Output Python code only.

Requirement:
{refined_spec}

Code:
{artifact}
";

const PACKAGE_TEMPLATE: &str = "\
You prepare the files needed to run the code below.

- `requirements_txt`: third-party packages, one per line; empty if there are none.
- `run_sh`: a POSIX shell script that installs the requirements (when present) \
and starts the program.

Requirement:
{refined_spec}

Code:
{artifact}
";

/// Substitutes `{key}` markers in `template` in a single pass.
///
/// Only markers in the template itself are expanded; substituted values are
/// copied verbatim even when they contain marker text. Braces that do not
/// form a known marker are kept as they are.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut text = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        text.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let marker = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (close, *value))
        });
        match marker {
            Some((close, value)) => {
                text.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                text.push('{');
                rest = after;
            }
        }
    }
    text.push_str(rest);
    text
}

pub fn refine(original_input: &str) -> Instructions {
    Instructions {
        stage: StageId::Refine,
        shape: OutputShape::Text,
        text: render(REFINE_TEMPLATE, &[("original_input", original_input)]),
    }
}

/// Produce instructions; `review_feedback` is appended as its own block when
/// the previous review left any.
pub fn produce(refined_spec: &str, review_feedback: &str) -> Instructions {
    let feedback_block = if review_feedback.trim().is_empty() {
        String::new()
    } else {
        format!("\nReview Feedback:\n{review_feedback}\n")
    };
    Instructions {
        stage: StageId::Produce,
        shape: OutputShape::Text,
        text: render(
            PRODUCE_TEMPLATE,
            &[
                ("refined_spec", refined_spec),
                ("review_feedback_block", &feedback_block),
            ],
        ),
    }
}

pub fn review(refined_spec: &str, artifact: &str) -> Instructions {
    with_artifact(StageId::Review, OutputShape::Review, REVIEW_TEMPLATE, refined_spec, artifact)
}

pub fn document(refined_spec: &str, artifact: &str) -> Instructions {
    with_artifact(StageId::Document, OutputShape::Text, DOCUMENT_TEMPLATE, refined_spec, artifact)
}

pub fn test_suite(refined_spec: &str, artifact: &str) -> Instructions {
    with_artifact(StageId::Test, OutputShape::Text, TEST_TEMPLATE, refined_spec, artifact)
}

pub fn package(refined_spec: &str, artifact: &str) -> Instructions {
    with_artifact(StageId::Package, OutputShape::Package, PACKAGE_TEMPLATE, refined_spec, artifact)
}

fn with_artifact(
    stage: StageId,
    shape: OutputShape,
    template: &str,
    refined_spec: &str,
    artifact: &str,
) -> Instructions {
    Instructions {
        stage,
        shape,
        text: render(template, &[("refined_spec", refined_spec), ("artifact", artifact)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produce_omits_feedback_block_when_empty() {
        let instructions = produce("spec", "");
        assert!(!instructions.text.contains("Review Feedback"));
        assert!(!instructions.text.contains('{'));
    }

    #[test]
    fn produce_includes_feedback_after_rejection() {
        let instructions = produce("spec", "handle duplicate names");
        assert!(instructions.text.contains("Review Feedback:\nhandle duplicate names"));
    }

    #[test]
    fn structured_stages_request_structured_shapes() {
        assert_eq!(review("s", "a").shape, OutputShape::Review);
        assert_eq!(package("s", "a").shape, OutputShape::Package);
        assert_eq!(document("s", "a").shape, OutputShape::Text);
    }

    #[test]
    fn every_placeholder_is_filled() {
        for instructions in [
            refine("input"),
            review("spec", "code"),
            document("spec", "code"),
            test_suite("spec", "code"),
            package("spec", "code"),
        ] {
            assert!(!instructions.text.contains("{refined_spec}"));
            assert!(!instructions.text.contains("{artifact}"));
            assert!(!instructions.text.contains("{original_input}"));
        }
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let instructions = review("spec mentions {artifact} literally", "CODE");
        assert!(instructions.text.contains("spec mentions {artifact} literally"));
        assert_eq!(instructions.text.matches("CODE").count(), 1);

        let instructions = produce("uses {review_feedback_block}", "");
        assert!(instructions.text.contains("uses {review_feedback_block}"));
    }

    #[test]
    fn unknown_and_unclosed_braces_are_kept() {
        assert_eq!(
            render("{a} {b} {a", &[("a", "1")]),
            "1 {b} {a"
        );
        assert_eq!(render("fn main() {}", &[]), "fn main() {}");
    }
}
