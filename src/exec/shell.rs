use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExecError;

/// Raw outcome of a shell command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellCommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub working_directory: Option<String>,
    pub sandbox_failure_message: Option<String>,
    pub duration_millis: Option<u64>,
}

impl ShellCommandResult {
    /// Exit code zero and no sandbox failure.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.sandbox_failure_message.is_none()
    }
}

/// Executes shell commands on behalf of the `shell` tool.
///
/// `Err` means the runner itself failed (spawn, timeout); a command that ran
/// and exited non-zero is an `Ok` result.
#[async_trait]
pub trait ShellRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<ShellCommandResult, ExecError>;
}

/// Runs commands through `sh -c` in a fixed working directory with a timeout.
pub struct SystemShellRunner {
    working_dir: PathBuf,
    timeout_secs: u64,
}

impl SystemShellRunner {
    pub fn new(working_dir: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            working_dir: working_dir.into(),
            timeout_secs,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

#[async_trait]
impl ShellRunner for SystemShellRunner {
    async fn run(&self, command: &str) -> Result<ShellCommandResult, ExecError> {
        let started = Instant::now();
        let working_directory = Some(self.working_dir.display().to_string());

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            // Own process group so a timeout can take down grandchildren too.
            .process_group(0);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                tracing::warn!(error = %e, "Shell spawn blocked by sandbox");
                return Ok(ShellCommandResult {
                    exit_code: -1,
                    working_directory,
                    sandbox_failure_message: Some(e.to_string()),
                    duration_millis: Some(elapsed_millis(started)),
                    ..Default::default()
                });
            }
            Err(e) => return Err(ExecError::SpawnFailed(e.to_string())),
        };
        let pid = child.id();

        let output = match tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ExecError::ProcessFailed(e.to_string())),
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                tracing::warn!(command, timeout_secs = self.timeout_secs, "Shell command timed out");
                return Err(ExecError::TimedOut {
                    timeout_secs: self.timeout_secs,
                });
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        let sandbox_failure_message = detect_sandbox_failure(exit_code, &stderr);

        Ok(ShellCommandResult {
            exit_code,
            stdout,
            stderr: if sandbox_failure_message.is_some() {
                String::new()
            } else {
                stderr
            },
            working_directory,
            sandbox_failure_message,
            duration_millis: Some(elapsed_millis(started)),
        })
    }
}

fn elapsed_millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn kill_process_group(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = nix::sys::signal::killpg(
        nix::unistd::Pid::from_raw(raw),
        nix::sys::signal::Signal::SIGKILL,
    ) {
        tracing::debug!(pid, error = %e, "Process group already gone");
    }
}

/// Recognise a permission failure imposed by the sandbox rather than by the
/// command itself.
///
/// Only the exit codes that shells and coreutils use for permission problems
/// (126, 13, 1) qualify, and only when stderr says so.
pub fn detect_sandbox_failure(exit_code: i32, stderr: &str) -> Option<String> {
    if stderr.trim().is_empty() {
        return None;
    }
    let normalized = stderr.to_lowercase();
    let permission_denied = normalized.contains("permission denied")
        || normalized.contains("operation not permitted");
    if permission_denied && matches!(exit_code, 126 | 13 | 1) {
        Some(stderr.trim().to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_failure_requires_permission_text_and_known_code() {
        assert_eq!(
            detect_sandbox_failure(126, "sh: ./run: Permission denied\n"),
            Some("sh: ./run: Permission denied".to_string())
        );
        assert_eq!(detect_sandbox_failure(2, "Permission denied"), None);
        assert_eq!(detect_sandbox_failure(1, "no such file"), None);
        assert_eq!(detect_sandbox_failure(1, "   "), None);
    }

    #[test]
    fn success_requires_zero_exit_and_no_sandbox_failure() {
        let ok = ShellCommandResult::default();
        assert!(ok.is_success());

        let sandboxed = ShellCommandResult {
            sandbox_failure_message: Some("Permission denied".into()),
            ..Default::default()
        };
        assert!(!sandboxed.is_success());
    }
}
