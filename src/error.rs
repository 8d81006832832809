use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Protocol violations detected while assembling a prompt.
///
/// Both variants are caller contract violations: the turn fails immediately.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("Input cannot be empty.")]
    EmptyInput,

    #[error("Invalid conversation state: {0}")]
    InvalidState(String),
}

/// Errors related to shell command execution.
///
/// These describe transport failures of the runner itself. A command that
/// ran and exited non-zero is not an error; it is a `ShellCommandResult`.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Failed to spawn shell process: {0}")]
    SpawnFailed(String),

    #[error("Command timed out after {timeout_secs}s")]
    TimedOut { timeout_secs: u64 },

    #[error("Process execution failed: {0}")]
    ProcessFailed(String),
}

/// Errors related to the agent turn loop and its subsystems.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Approval decision for `{id}` does not match the pending request")]
    StaleApproval { id: String },

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("Instructions file not found at {path}")]
    InstructionsNotFound { path: PathBuf },

    #[error("LLM transport error: {0}")]
    Transport(String),

    #[error("Step budget of {max_steps} exhausted before the turn finished")]
    MaxStepsExceeded { max_steps: usize },

    #[error("Session logging error: {0}")]
    LoggingError(String),
}
