//! Prompt rendering for first attempts and fix retries.

use super::types::{ExecutionAttempt, TaskManifest};

/// Embedded previous code is cut beyond this many characters.
pub(crate) const MAX_EMBEDDED_CODE_CHARS: usize = 4_000;

/// At most this many prior failure reasons are embedded in a fix prompt.
pub(crate) const MAX_EMBEDDED_FAILURES: usize = 20;

/// Prompt for a fresh generation (attempt 1).
pub(crate) fn render_generation_prompt(task: &TaskManifest) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("# Task: {}\n\n", task.name));
    prompt.push_str(&task.description);
    prompt.push_str("\n\nRespond with a single complete implementation in one fenced code block. ");
    prompt.push_str("Do not include commentary outside the code block.\n");
    prompt
}

/// Prompt for a fix attempt (attempt > 1): embeds the previous attempt's
/// code and the accumulated failure reasons.
pub(crate) fn render_fix_prompt(
    task: &TaskManifest,
    history: &[ExecutionAttempt],
) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("# Task: {}\n\n", task.name));
    prompt.push_str(&task.description);

    if let Some(previous) = history.last() {
        prompt.push_str("\n\n## Previous Attempt\n");
        prompt.push_str("Your previous implementation did not pass:\n\n```\n");
        prompt.push_str(&truncate_code(&previous.extracted_code));
        prompt.push_str("\n```\n");
    }

    // Most recent attempts carry the most relevant diagnostics.
    let reasons: Vec<&str> = history
        .iter()
        .rev()
        .flat_map(|attempt| attempt.failure_reasons.iter().map(String::as_str))
        .take(MAX_EMBEDDED_FAILURES)
        .collect();
    if !reasons.is_empty() {
        prompt.push_str("\n## Failure Reasons\n");
        for reason in reasons {
            prompt.push_str(&format!("- {}\n", reason));
        }
    }

    prompt.push_str(
        "\n## Instructions\nFix the implementation so every failure above is resolved. ",
    );
    prompt.push_str("Respond with the complete corrected implementation in one fenced code block.\n");
    prompt
}

fn truncate_code(code: &str) -> String {
    if code.len() <= MAX_EMBEDDED_CODE_CHARS {
        return code.to_string();
    }
    // Cut on a char boundary at or below the limit.
    let mut end = MAX_EMBEDDED_CODE_CHARS;
    while !code.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... [truncated]", &code[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn task() -> Arc<TaskManifest> {
        Arc::new(TaskManifest {
            name: "reverse-list".to_string(),
            description: "Reverse a singly linked list in place.".to_string(),
        })
    }

    #[test]
    fn generation_prompt_includes_task() {
        let prompt = render_generation_prompt(&task());
        assert!(prompt.contains("reverse-list"));
        assert!(prompt.contains("Reverse a singly linked list"));
        assert!(prompt.contains("fenced code block"));
    }

    #[test]
    fn fix_prompt_embeds_previous_code_and_reasons() {
        let history = vec![ExecutionAttempt {
            extracted_code: "fn reverse() {}".to_string(),
            failure_reasons: vec!["test_empty failed".to_string()],
        }];
        let prompt = render_fix_prompt(&task(), &history);
        assert!(prompt.contains("fn reverse() {}"));
        assert!(prompt.contains("test_empty failed"));
        assert!(prompt.contains("Previous Attempt"));
    }

    #[test]
    fn fix_prompt_truncates_long_code() {
        let history = vec![ExecutionAttempt {
            extracted_code: "x".repeat(MAX_EMBEDDED_CODE_CHARS + 500),
            failure_reasons: vec![],
        }];
        let prompt = render_fix_prompt(&task(), &history);
        assert!(prompt.contains("... [truncated]"));
        // The embedded block must not carry the full original.
        assert!(!prompt.contains(&"x".repeat(MAX_EMBEDDED_CODE_CHARS + 500)));
    }

    #[test]
    fn fix_prompt_caps_failure_reasons_at_twenty() {
        let history: Vec<ExecutionAttempt> = (0..5)
            .map(|attempt| ExecutionAttempt {
                extracted_code: String::new(),
                failure_reasons: (0..10)
                    .map(|reason| format!("attempt {attempt} reason {reason}"))
                    .collect(),
            })
            .collect();
        let prompt = render_fix_prompt(&task(), &history);
        let embedded = prompt.matches("reason ").count();
        assert_eq!(embedded, MAX_EMBEDDED_FAILURES);
        // Most recent attempt's reasons come first.
        assert!(prompt.contains("attempt 4 reason 0"));
        assert!(!prompt.contains("attempt 0 reason 0"));
    }
}
