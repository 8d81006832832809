//! Normalizes a finished shell command into bounded text for the model.

use serde::Serialize;

use super::shell::ShellCommandResult;

/// Outputs longer than this many characters are truncated.
pub const MAX_OUTPUT_CHARS: usize = 8192;
/// Characters kept from the start of a truncated output.
pub const HEAD_CHARS: usize = 3072;
/// Characters kept from the end of a truncated output.
pub const TAIL_CHARS: usize = 3072;

/// Formatted command output plus whether anything was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedOutput {
    pub text: String,
    pub truncated: bool,
}

/// Format a command result.
///
/// Sandbox failures short-circuit everything else and are never truncated.
/// Otherwise stdout comes first; stderr follows under a `stderr:` heading
/// when both streams have content.
pub fn format_output(result: &ShellCommandResult) -> FormattedOutput {
    if let Some(message) = &result.sandbox_failure_message {
        return FormattedOutput {
            text: format!("failed in sandbox: {message}"),
            truncated: false,
        };
    }

    let stdout = result.stdout.trim_end();
    let stderr = result.stderr.trim_end();

    let mut combined = String::with_capacity(stdout.len() + stderr.len() + 10);
    if !stdout.is_empty() {
        combined.push_str(stdout);
    }
    if !stderr.is_empty() {
        if !stdout.is_empty() {
            combined.push_str("\n\nstderr:\n");
        }
        combined.push_str(stderr);
    }

    if combined.is_empty() {
        let text = if result.exit_code == 0 {
            "Command completed with no output.".to_string()
        } else {
            format!("Command exited with code {}.", result.exit_code)
        };
        return FormattedOutput {
            text,
            truncated: false,
        };
    }

    truncate_middle(combined)
}

/// Keep the head and tail of `text` when it exceeds [`MAX_OUTPUT_CHARS`].
///
/// Lengths are counted in `char`s so the cut never lands inside a UTF-8
/// sequence.
fn truncate_middle(text: String) -> FormattedOutput {
    let total = text.chars().count();
    if total <= MAX_OUTPUT_CHARS {
        return FormattedOutput {
            text,
            truncated: false,
        };
    }

    let head: String = text.chars().take(HEAD_CHARS).collect();
    let tail: String = text.chars().skip(total - TAIL_CHARS).collect();
    let omitted = total.saturating_sub(HEAD_CHARS + TAIL_CHARS);

    FormattedOutput {
        text: format!(
            "{}\n...\n[omitted {omitted} characters]\n{}",
            head.trim_end(),
            tail.trim_start()
        ),
        truncated: true,
    }
}
