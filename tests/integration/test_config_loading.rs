use serial_test::serial;
use std::env;
use std::fs;
use strata::core::config::{ConfigLoader, EngineConfig};
use strata::core::types::ErrorCategory;
use tempfile::TempDir;

fn clear_env() {
    env::remove_var("STRATA_MAX_CONTEXT_DEPTH");
    env::remove_var("STRATA_MAX_OPERATIONS");
}

#[test]
#[serial]
fn test_missing_file_yields_defaults() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let config = ConfigLoader::load_from_workspace(dir.path()).unwrap();
    assert_eq!(config.engine, EngineConfig::default());
    assert_eq!(config.engine.max_context_depth, 10);
}

#[test]
#[serial]
fn test_file_values_are_loaded() {
    clear_env();
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("strata.toml"),
        "[engine]\nmax_context_depth = 4\ndefault_item_var = \"entry\"\n\n[logging]\ndefault_level = \"warn\"\n",
    )
    .unwrap();

    let config = ConfigLoader::load_from_workspace(dir.path()).unwrap();
    assert_eq!(config.engine.max_context_depth, 4);
    assert_eq!(config.engine.default_item_var, "entry");
    assert_eq!(config.engine.default_index_var, "index");
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("strata.toml"),
        "[engine]\nmax_context_depth = 4\nmax_operations = 100\n",
    )
    .unwrap();

    env::set_var("STRATA_MAX_CONTEXT_DEPTH", "7");
    env::set_var("STRATA_MAX_OPERATIONS", "not-a-number");
    let config = ConfigLoader::load_from_workspace(dir.path()).unwrap();
    clear_env();

    assert_eq!(config.engine.max_context_depth, 7);
    assert_eq!(config.engine.max_operations, 100);
}

#[test]
#[serial]
fn test_invalid_toml_is_a_configuration_error() {
    clear_env();
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("strata.toml"), "[engine\nmax_context_depth = ").unwrap();

    let err = ConfigLoader::load_from_workspace(dir.path()).unwrap_err();
    assert_eq!(err.category, ErrorCategory::ConfigurationError);
}

#[test]
#[serial]
fn test_zero_depth_is_rejected() {
    clear_env();
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("strata.toml"), "[engine]\nmax_context_depth = 0\n").unwrap();

    let err = ConfigLoader::load_from_workspace(dir.path()).unwrap_err();
    assert_eq!(err.category, ErrorCategory::ConfigurationError);
    assert!(err.message.contains("max_context_depth"));
}

#[test]
fn test_env_var_documentation_lists_overrides() {
    let docs = ConfigLoader::env_var_documentation();
    assert!(docs.iter().any(|line| line.starts_with("STRATA_MAX_CONTEXT_DEPTH")));
    assert!(docs.iter().any(|line| line.starts_with("STRATA_LOG_LEVEL")));
}
