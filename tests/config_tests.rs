use std::path::PathBuf;

use pretty_assertions::assert_eq;
use tandem::config::{CONFIG_FILE_NAME, PartialConfig, load_layers};
use tandem::prompt::InstructionStore;
use tempfile::TempDir;

fn setup_dirs() -> (TempDir, PathBuf, PathBuf) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let project = tmp.path().join("project");
    let global_dir = tmp.path().join("global");
    std::fs::create_dir_all(&project).unwrap();
    std::fs::create_dir_all(&global_dir).unwrap();
    let global = global_dir.join(CONFIG_FILE_NAME);
    (tmp, project, global)
}

// ============================================================
// Layering
// ============================================================

#[test]
fn test_project_overrides_global_per_key() {
    let (_tmp, project, global) = setup_dirs();
    std::fs::write(
        &global,
        "[model]\nid = \"global-model\"\nparallel_tool_calls = false\n\n[shell]\ntimeout_secs = 90\n",
    )
    .unwrap();
    std::fs::write(
        project.join(CONFIG_FILE_NAME),
        "[model]\nid = \"project-model\"\n\n[agent]\nmax_steps = 7\n",
    )
    .unwrap();

    let cli = PartialConfig {
        project_root: Some(project.clone()),
        ..Default::default()
    };
    let config = load_layers(cli, None, Some(&global)).unwrap();

    assert_eq!(config.model_id, "project-model");
    assert!(!config.parallel_tool_calls);
    assert_eq!(config.shell_timeout_secs, 90);
    assert_eq!(config.max_steps, 7);
    assert_eq!(config.log_dir, project.join(".tandem").join("logs"));
}

#[test]
fn test_global_file_can_choose_project_root() {
    let (_tmp, project, global) = setup_dirs();
    std::fs::write(
        &global,
        format!("[general]\nproject_root = {:?}\n", project.display().to_string()),
    )
    .unwrap();
    std::fs::write(project.join(CONFIG_FILE_NAME), "[agent]\nmax_steps = 4\n").unwrap();

    let config = load_layers(PartialConfig::default(), None, Some(&global)).unwrap();
    assert_eq!(config.project_root, project);
    assert_eq!(config.max_steps, 4);
}

#[test]
fn test_explicit_file_replaces_project_lookup() {
    let (tmp, project, _global) = setup_dirs();
    std::fs::write(project.join(CONFIG_FILE_NAME), "[agent]\nmax_steps = 4\n").unwrap();
    let explicit = tmp.path().join("custom.toml");
    std::fs::write(&explicit, "[agent]\nmax_steps = 11\n").unwrap();

    let cli = PartialConfig {
        project_root: Some(project),
        ..Default::default()
    };
    let config = load_layers(cli, Some(&explicit), None).unwrap();
    assert_eq!(config.max_steps, 11);
}

#[test]
fn test_explicit_file_with_unknown_section_is_an_error() {
    let (tmp, _project, _global) = setup_dirs();
    let explicit = tmp.path().join("custom.toml");
    std::fs::write(&explicit, "[safety]\nshell_timeout_secs = 5\n").unwrap();

    let err = load_layers(PartialConfig::default(), Some(&explicit), None).unwrap_err();
    assert!(err.to_string().contains("custom.toml"));
}

// ============================================================
// Model family and instructions
// ============================================================

#[test]
fn test_model_family_reflects_config() {
    let (_tmp, project, _global) = setup_dirs();
    std::fs::write(
        project.join(CONFIG_FILE_NAME),
        "[model]\nid = \"m\"\nbase_instructions = \"Be brief.\"\nneeds_apply_patch_instructions = false\n",
    )
    .unwrap();
    let cli = PartialConfig {
        project_root: Some(project),
        ..Default::default()
    };
    let family = load_layers(cli, None, None).unwrap().model_family();

    assert_eq!(family.id, "m");
    assert_eq!(family.base_instructions, "Be brief.");
    assert!(family.supports_parallel_tool_calls);
    assert!(!family.needs_special_apply_patch_instructions);
}

#[test]
fn test_base_instructions_file_is_loaded_through_store() {
    let (_tmp, project, _global) = setup_dirs();
    std::fs::write(project.join("AGENTS.md"), "Project rules.").unwrap();
    std::fs::write(
        project.join(CONFIG_FILE_NAME),
        "[model]\nbase_instructions_file = \"AGENTS.md\"\n",
    )
    .unwrap();
    let cli = PartialConfig {
        project_root: Some(project),
        ..Default::default()
    };
    let config = load_layers(cli, None, None).unwrap();

    let store = InstructionStore::new();
    assert_eq!(
        config.base_instructions_override(&store).unwrap().as_deref(),
        Some("Project rules.")
    );
}

#[test]
fn test_missing_instructions_file_is_an_error() {
    let config = PartialConfig {
        base_instructions_file: Some(PathBuf::from("/nonexistent/AGENTS.md")),
        ..Default::default()
    }
    .finalize();
    assert!(config.base_instructions_override(&InstructionStore::new()).is_err());
}
