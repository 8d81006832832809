//! The `shell` tool: classify, run and format a single command.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

use super::tool_result::{ExplorationMetadata, ToolResult};
use super::tools::{ToolHandler, string_arg};
use crate::exec::{ParsedCommand, ShellCommandResult, ShellRunner, format_output, parse, tokenize};
use crate::prompt::ToolSpec;

/// JSON payload carried in [`ToolResult::data`] for every shell run.
#[derive(Debug, Clone, Serialize)]
pub struct ShellCommandPayload {
    pub command: String,
    pub argv: Vec<String>,
    pub parsed_command: ParsedCommand,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub working_directory: Option<String>,
    pub formatted_output: String,
    pub truncated: bool,
    pub sandbox_failure_message: Option<String>,
    pub duration_millis: Option<u64>,
}

pub struct ShellToolHandler {
    runner: Arc<dyn ShellRunner>,
}

impl ShellToolHandler {
    pub fn new(runner: Arc<dyn ShellRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ToolHandler for ShellToolHandler {
    fn name(&self) -> &str {
        "shell"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "shell",
            "Execute a shell command in the project root via `sh -c`. \
             Returns the formatted output; long output is truncated in the middle.",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute"
                    }
                },
                "required": ["command"]
            }),
        )
    }

    fn is_potentially_dangerous(&self) -> bool {
        true
    }

    async fn invoke(&self, args: &Value) -> ToolResult {
        let command = string_arg(args, "command").unwrap_or_default().trim();
        if command.is_empty() {
            return ToolResult::failure("The 'command' parameter cannot be empty.");
        }

        let argv = tokenize(command);
        let parsed = parse(&argv, command);
        tracing::info!(command, kind = parsed_kind(&parsed), "Running shell command");

        let result = match self.runner.run(command).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(command, error = %e, "Shell runner failed");
                ShellCommandResult {
                    exit_code: -1,
                    stderr: e.to_string(),
                    ..ShellCommandResult::default()
                }
            }
        };

        let formatted = format_output(&result);
        let success = result.is_success();
        tracing::debug!(
            command,
            exit_code = result.exit_code,
            truncated = formatted.truncated,
            success,
            "Shell command finished"
        );

        let exploration = success.then(|| exploration_for(&parsed, &result)).flatten();
        let payload = ShellCommandPayload {
            command: command.to_string(),
            argv,
            parsed_command: parsed,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            exit_code: result.exit_code,
            working_directory: result.working_directory.clone(),
            formatted_output: formatted.text.clone(),
            truncated: formatted.truncated,
            sandbox_failure_message: result.sandbox_failure_message.clone(),
            duration_millis: result.duration_millis,
        };
        let data = serde_json::to_string(&payload).unwrap_or_else(|e| {
            json!({"error": format!("Failed to serialize shell payload: {e}")}).to_string()
        });

        if success {
            ToolResult::success(formatted.text)
                .with_data(data)
                .with_exploration(exploration)
        } else {
            let details = if !result.stderr.trim().is_empty() {
                result.stderr
            } else {
                result
                    .sandbox_failure_message
                    .unwrap_or_else(|| formatted.text.clone())
            };
            ToolResult::failure(formatted.text)
                .with_data(data)
                .with_error_details(details)
        }
    }
}

fn parsed_kind(parsed: &ParsedCommand) -> &'static str {
    match parsed {
        ParsedCommand::Read { .. } => "read",
        ParsedCommand::ListFiles { .. } => "list_files",
        ParsedCommand::Search { .. } => "search",
        ParsedCommand::Unknown { .. } => "unknown",
    }
}

fn non_empty_lines(text: &str) -> usize {
    text.lines().filter(|l| !l.trim().is_empty()).count()
}

fn exploration_for(
    parsed: &ParsedCommand,
    result: &ShellCommandResult,
) -> Option<ExplorationMetadata> {
    match parsed {
        ParsedCommand::Read { files, .. } => Some(ExplorationMetadata::read(files.clone())),
        ParsedCommand::ListFiles { path, .. } => Some(
            ExplorationMetadata::list(path.clone())
                .with_entry_count(non_empty_lines(&result.stdout)),
        ),
        ParsedCommand::Search { query, path, .. } => Some(
            ExplorationMetadata::search(query.clone(), path.clone())
                .with_match_count(non_empty_lines(&result.stdout)),
        ),
        ParsedCommand::Unknown { .. } => None,
    }
}
