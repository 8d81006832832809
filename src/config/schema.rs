use serde::Deserialize;
use std::path::PathBuf;

/// The TOML file structure for tandem.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub model: Option<ModelConfig>,
    pub agent: Option<AgentConfig>,
    pub shell: Option<ShellConfig>,
}

#[derive(Debug, Deserialize, Default)]
pub struct GeneralConfig {
    pub project_root: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ModelConfig {
    pub id: Option<String>,
    /// Inline base instructions for the model family.
    pub base_instructions: Option<String>,
    /// File whose content overrides the base instructions for every turn.
    pub base_instructions_file: Option<String>,
    pub parallel_tool_calls: Option<bool>,
    pub needs_apply_patch_instructions: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AgentConfig {
    pub max_steps: Option<usize>,
    pub log_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ShellConfig {
    pub timeout_secs: Option<u64>,
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub project_root: PathBuf,
    pub model_id: String,
    pub base_instructions: String,
    /// Resolved against `project_root` when relative.
    pub base_instructions_file: Option<PathBuf>,
    pub parallel_tool_calls: bool,
    pub needs_apply_patch_instructions: bool,
    pub max_steps: usize,
    /// Resolved against `project_root` when relative.
    pub log_dir: PathBuf,
    pub shell_timeout_secs: u64,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialConfig {
    pub project_root: Option<PathBuf>,
    pub model_id: Option<String>,
    pub base_instructions: Option<String>,
    pub base_instructions_file: Option<PathBuf>,
    pub parallel_tool_calls: Option<bool>,
    pub needs_apply_patch_instructions: Option<bool>,
    pub max_steps: Option<usize>,
    pub log_dir: Option<PathBuf>,
    pub shell_timeout_secs: Option<u64>,
}

impl ConfigFile {
    pub fn to_partial(&self) -> PartialConfig {
        let general = self.general.as_ref();
        let model = self.model.as_ref();
        let agent = self.agent.as_ref();
        PartialConfig {
            project_root: general.and_then(|g| g.project_root.as_ref()).map(PathBuf::from),
            model_id: model.and_then(|m| m.id.clone()),
            base_instructions: model.and_then(|m| m.base_instructions.clone()),
            base_instructions_file: model
                .and_then(|m| m.base_instructions_file.as_ref())
                .map(PathBuf::from),
            parallel_tool_calls: model.and_then(|m| m.parallel_tool_calls),
            needs_apply_patch_instructions: model.and_then(|m| m.needs_apply_patch_instructions),
            max_steps: agent.and_then(|a| a.max_steps),
            log_dir: agent.and_then(|a| a.log_dir.as_ref()).map(PathBuf::from),
            shell_timeout_secs: self.shell.as_ref().and_then(|s| s.timeout_secs),
        }
    }
}
