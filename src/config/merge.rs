use super::schema::{AppConfig, PartialConfig};
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL_ID: &str = "default";
pub const DEFAULT_MAX_STEPS: usize = 20;
pub const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_BASE_INSTRUCTIONS: &str = "\
You are a coding agent working inside a software project.
Use the available tools to inspect and change files. Prefer small, verifiable steps.
Explain what you changed when you are done.";

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            project_root: self.project_root.or(fallback.project_root),
            model_id: self.model_id.or(fallback.model_id),
            base_instructions: self.base_instructions.or(fallback.base_instructions),
            base_instructions_file: self.base_instructions_file.or(fallback.base_instructions_file),
            parallel_tool_calls: self.parallel_tool_calls.or(fallback.parallel_tool_calls),
            needs_apply_patch_instructions: self
                .needs_apply_patch_instructions
                .or(fallback.needs_apply_patch_instructions),
            max_steps: self.max_steps.or(fallback.max_steps),
            log_dir: self.log_dir.or(fallback.log_dir),
            shell_timeout_secs: self.shell_timeout_secs.or(fallback.shell_timeout_secs),
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> AppConfig {
        let project_root = self.project_root.unwrap_or_else(|| PathBuf::from("."));
        let log_dir = self
            .log_dir
            .map(|dir| under_root(&project_root, dir))
            .unwrap_or_else(|| project_root.join(".tandem").join("logs"));

        AppConfig {
            model_id: self.model_id.unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            base_instructions: self
                .base_instructions
                .unwrap_or_else(|| DEFAULT_BASE_INSTRUCTIONS.to_string()),
            base_instructions_file: self
                .base_instructions_file
                .map(|file| under_root(&project_root, file)),
            parallel_tool_calls: self.parallel_tool_calls.unwrap_or(true),
            needs_apply_patch_instructions: self.needs_apply_patch_instructions.unwrap_or(true),
            max_steps: self.max_steps.unwrap_or(DEFAULT_MAX_STEPS).max(1),
            shell_timeout_secs: self.shell_timeout_secs.unwrap_or(DEFAULT_SHELL_TIMEOUT_SECS),
            log_dir,
            project_root,
        }
    }
}

fn under_root(root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() { path } else { root.join(path) }
}
