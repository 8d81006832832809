//! Tool handlers and the name-based router the executor dispatches through.
//!
//! Handlers never return `Err`: every outcome, including bad arguments and
//! I/O failures, is a [`ToolResult`] so the model can observe it and react.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::shell_tool::ShellToolHandler;
use super::tool_result::{ExplorationMetadata, ToolResult};
use crate::exec::ShellRunner;
use crate::prompt::ToolSpec;

/// A tool the model can call.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Schema advertised to the model.
    fn spec(&self) -> ToolSpec;

    /// Calls that may modify the project need user approval first.
    fn is_potentially_dangerous(&self) -> bool {
        false
    }

    /// Read-only handlers can run concurrently with each other.
    fn is_parallel_safe(&self) -> bool {
        false
    }

    /// Files this call may modify, snapshotted before `invoke`.
    fn touched_paths(&self, _args: &Value) -> Vec<PathBuf> {
        Vec::new()
    }

    async fn invoke(&self, args: &Value) -> ToolResult;
}

/// Registry of handlers keyed by tool name, in registration order.
#[derive(Default, Clone)]
pub struct ToolRouter {
    handlers: Vec<Arc<dyn ToolHandler>>,
    index: HashMap<String, usize>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handler`, replacing any earlier handler with the same name.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => self.handlers[slot] = handler,
            None => {
                self.index.insert(name, self.handlers.len());
                self.handlers.push(handler);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.index.get(name).map(|&slot| &self.handlers[slot])
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.handlers.iter().map(|h| h.spec()).collect()
    }

    /// Invoke `name` directly, without approval or diff tracking.
    pub async fn dispatch(&self, name: &str, args: &Value) -> ToolResult {
        match self.get(name) {
            Some(handler) => handler.invoke(args).await,
            None => unknown_tool(name),
        }
    }
}

pub(crate) fn unknown_tool(name: &str) -> ToolResult {
    ToolResult::failure(format!("Unknown function '{name}'"))
}

/// Router with the built-in `shell`, `read_file` and `update_file` tools.
pub fn default_router(project_root: &Path, runner: Arc<dyn ShellRunner>) -> ToolRouter {
    let mut router = ToolRouter::new();
    router.register(Arc::new(ShellToolHandler::new(runner)));
    router.register(Arc::new(ReadFileHandler::new(project_root)));
    router.register(Arc::new(UpdateFileHandler::new(project_root)));
    router
}

pub(crate) fn string_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// Reads a file. Relative paths resolve against the project root; reads
/// are not restricted to it.
pub struct ReadFileHandler {
    root: PathBuf,
}

impl ReadFileHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ToolHandler for ReadFileHandler {
    fn name(&self) -> &str {
        "read_file"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "read_file",
            "Read the contents of a file. The path can be relative to the project root or absolute.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path, relative to the project root or absolute"
                    }
                },
                "required": ["path"]
            }),
        )
    }

    fn is_parallel_safe(&self) -> bool {
        true
    }

    async fn invoke(&self, args: &Value) -> ToolResult {
        let Some(path) = string_arg(args, "path").map(str::trim).filter(|p| !p.is_empty()) else {
            return ToolResult::failure("The 'path' parameter cannot be empty.");
        };

        match tokio::fs::read_to_string(self.root.join(path)).await {
            Ok(content) => {
                let lines = content.lines().count();
                ToolResult::success(format!("Read {path} ({lines} lines)."))
                    .with_data(content)
                    .with_exploration(Some(ExplorationMetadata::read(vec![path.to_string()])))
            }
            Err(e) => ToolResult::failure(format!("Failed to read {path}."))
                .with_error_details(e.to_string()),
        }
    }
}

/// Replaces a file inside the project root with new content.
pub struct UpdateFileHandler {
    root: PathBuf,
}

impl UpdateFileHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `path` for writing, rejecting anything that escapes the root.
    ///
    /// Lexical check first so no directories are created outside the root,
    /// then a canonical check to catch symlinks.
    async fn resolve_for_write(&self, path: &str) -> Result<PathBuf, String> {
        let relative = Path::new(path);
        let escapes = relative.components().try_fold(0usize, |depth, c| match c {
            Component::Normal(_) => Some(depth + 1),
            Component::CurDir => Some(depth),
            Component::ParentDir => depth.checked_sub(1),
            Component::RootDir | Component::Prefix(_) => None,
        });
        if escapes.is_none() {
            return Err(format!("Path '{path}' is outside the project root."));
        }

        let full = self.root.join(relative);
        let parent = full
            .parent()
            .ok_or_else(|| format!("Path '{path}' has no parent directory."))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("Failed to create directories: {e}"))?;

        let canonical_root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|e| format!("Failed to resolve project root: {e}"))?;
        let canonical_parent = tokio::fs::canonicalize(parent)
            .await
            .map_err(|e| format!("Failed to resolve path: {e}"))?;
        if !canonical_parent.starts_with(&canonical_root) {
            return Err(format!("Path '{path}' is outside the project root."));
        }
        Ok(full)
    }
}

#[async_trait]
impl ToolHandler for UpdateFileHandler {
    fn name(&self) -> &str {
        "update_file"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "update_file",
            "Write the complete new content of a file inside the project root. \
             Parent directories are created automatically.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "File path relative to the project root"
                    },
                    "content": {
                        "type": "string",
                        "description": "Complete new content of the file"
                    }
                },
                "required": ["path", "content"]
            }),
        )
    }

    fn is_potentially_dangerous(&self) -> bool {
        true
    }

    fn touched_paths(&self, args: &Value) -> Vec<PathBuf> {
        string_arg(args, "path")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| vec![PathBuf::from(p)])
            .unwrap_or_default()
    }

    async fn invoke(&self, args: &Value) -> ToolResult {
        let Some(path) = string_arg(args, "path").map(str::trim).filter(|p| !p.is_empty()) else {
            return ToolResult::failure("The 'path' parameter cannot be empty.");
        };
        let Some(content) = string_arg(args, "content") else {
            return ToolResult::failure("The 'content' parameter is required.");
        };

        let full = match self.resolve_for_write(path).await {
            Ok(full) => full,
            Err(reason) => return ToolResult::failure(reason),
        };

        match tokio::fs::write(&full, content).await {
            Ok(()) => {
                tracing::debug!(path, bytes = content.len(), "File updated");
                ToolResult::success(format!("Updated {path}."))
                    .with_data(json!({"path": path, "written_bytes": content.len()}).to_string())
            }
            Err(e) => ToolResult::failure(format!("Failed to write {path}."))
                .with_error_details(e.to_string()),
        }
    }
}
