pub mod merge;
pub mod schema;

pub use merge::DEFAULT_BASE_INSTRUCTIONS;
pub use schema::*;

use crate::cli::Cli;
use crate::error::{AgentError, ConfigError};
use crate::prompt::{InstructionStore, ModelFamily};
use std::path::{Path, PathBuf};

/// Name of the config file looked up in the project root and the global
/// config directory.
pub const CONFIG_FILE_NAME: &str = "tandem.toml";

/// Load configuration by merging global, project, and CLI sources.
/// Precedence: CLI > project config > global config > defaults.
///
/// Missing config files are handled gracefully (defaults apply). A file
/// passed explicitly with `--config` must exist and parse.
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let cli_partial = PartialConfig {
        project_root: cli.project_root.clone(),
        ..Default::default()
    };
    let config = load_layers(cli_partial, cli.config.as_deref(), global_config_path().as_deref())?;
    Ok(config)
}

/// Merge `cli` over the project layer over the global layer.
///
/// The project layer is `explicit` when given, otherwise
/// `{project_root}/tandem.toml` where the root comes from the CLI or the
/// global file.
pub fn load_layers(
    cli: PartialConfig,
    explicit: Option<&Path>,
    global_path: Option<&Path>,
) -> Result<AppConfig, ConfigError> {
    // Layer 1: Global config (~/.config/tandem/tandem.toml or platform equivalent)
    let global = global_path.map(load_optional).unwrap_or_default();

    // Layer 2: Project config, explicit file or {project_root}/tandem.toml
    let project = match explicit {
        Some(path) => load_toml_file(path)?.ok_or_else(|| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: "config file not found".to_string(),
        })?,
        None => {
            let root = cli
                .project_root
                .clone()
                .or_else(|| global.project_root.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            load_optional(&root.join(CONFIG_FILE_NAME))
        }
    };

    // Layer 3: CLI args
    Ok(cli.with_fallback(project).with_fallback(global).finalize())
}

/// Load a config file that may legitimately be absent or broken; problems
/// are logged and the layer is skipped.
fn load_optional(path: &Path) -> PartialConfig {
    match load_toml_file(path) {
        Ok(partial) => partial.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Config error: {e}");
            PartialConfig::default()
        }
    }
}

/// Load and parse a TOML config file. `Ok(None)` when the file does not exist.
fn load_toml_file(path: &Path) -> Result<Option<PartialConfig>, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let file: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(Some(file.to_partial()))
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/tandem/tandem.toml
/// macOS: ~/Library/Application Support/tandem/tandem.toml
fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tandem")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

impl AppConfig {
    pub fn model_family(&self) -> ModelFamily {
        ModelFamily {
            id: self.model_id.clone(),
            base_instructions: self.base_instructions.clone(),
            supports_parallel_tool_calls: self.parallel_tool_calls,
            needs_special_apply_patch_instructions: self.needs_apply_patch_instructions,
        }
    }

    /// Content of `base_instructions_file`, if one is configured.
    pub fn base_instructions_override(
        &self,
        store: &InstructionStore,
    ) -> Result<Option<String>, AgentError> {
        self.base_instructions_file
            .as_deref()
            .map(|path| store.load(path).map(|text| text.to_string()))
            .transpose()
    }
}
