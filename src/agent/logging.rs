//! JSONL session logger for full session replay.
//!
//! Each session writes `session-{timestamp}-{suffix}.jsonl` into the
//! configured log directory, one self-describing JSON object per line, flushed per event.
//!
//! Uses synchronous `std::fs`; writes are small and append-only.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AgentError;

/// Current UTC time as an ISO 8601 string with milliseconds.
pub fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// A structured log entry serialized as a single JSON line.
#[derive(Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LogEntry {
    SessionStart {
        timestamp: String,
        model: String,
        project_root: String,
    },

    UserMessage {
        timestamp: String,
        turn: u64,
        content: String,
    },

    /// Assistant text (intermediate narration or the final answer).
    AssistantText {
        timestamp: String,
        turn: u64,
        content: String,
    },

    ToolCall {
        timestamp: String,
        turn: u64,
        fn_name: String,
        fn_arguments: serde_json::Value,
    },

    ToolResult {
        timestamp: String,
        turn: u64,
        fn_name: String,
        success: bool,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Net file changes at the end of a turn.
    TurnDiff {
        timestamp: String,
        turn: u64,
        summary: String,
        files: Vec<String>,
    },

    Error {
        timestamp: String,
        turn: u64,
        message: String,
    },

    SessionEnd {
        timestamp: String,
        total_turns: u64,
        reason: String,
    },
}

/// Append-only JSONL logger for agent sessions.
pub struct SessionLogger {
    writer: BufWriter<fs::File>,
    log_path: PathBuf,
}

impl SessionLogger {
    /// Create the log directory if needed and open a new session file.
    ///
    /// Colons in the timestamp are replaced by dashes for filesystem safety.
    /// A random suffix keeps sessions started in the same millisecond apart.
    pub fn new(log_dir: &Path) -> Result<Self, AgentError> {
        fs::create_dir_all(log_dir).map_err(|e| {
            AgentError::LoggingError(format!("cannot create {}: {e}", log_dir.display()))
        })?;

        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3f");
        let suffix = Uuid::new_v4().simple().to_string();
        let log_path = log_dir.join(format!("session-{timestamp}-{}.jsonl", &suffix[..8]));

        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| {
                AgentError::LoggingError(format!("cannot open {}: {e}", log_path.display()))
            })?;

        Ok(Self {
            writer: BufWriter::new(file),
            log_path,
        })
    }

    /// Serialize a log entry as a single JSON line and flush.
    pub fn log_event(&mut self, event: &LogEntry) -> Result<(), AgentError> {
        let write = |writer: &mut BufWriter<fs::File>| -> std::io::Result<()> {
            serde_json::to_writer(&mut *writer, event)?;
            writer.write_all(b"\n")?;
            writer.flush()
        };
        write(&mut self.writer).map_err(|e| AgentError::LoggingError(e.to_string()))
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn log_session_start(&mut self, model: &str, project_root: &Path) -> Result<(), AgentError> {
        self.log_event(&LogEntry::SessionStart {
            timestamp: now_iso(),
            model: model.to_string(),
            project_root: project_root.display().to_string(),
        })
    }

    pub fn log_session_end(&mut self, total_turns: u64, reason: &str) -> Result<(), AgentError> {
        self.log_event(&LogEntry::SessionEnd {
            timestamp: now_iso(),
            total_turns,
            reason: reason.to_string(),
        })
    }
}
