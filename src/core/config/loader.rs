#![allow(clippy::result_large_err)]

use super::{EngineConfig, StrataConfig};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "strata.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from workspace root (workspace/strata.toml)
    /// Environment variables override config file values
    pub fn load_from_workspace(workspace_path: &Path) -> Result<StrataConfig, AppError> {
        Self::load(&workspace_path.join(CONFIG_FILE_NAME))
    }

    /// Load config from a path, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<StrataConfig, AppError> {
        let mut config = Self::load_from_file(path)?.unwrap_or_default();
        Self::apply_env_overrides(&mut config);
        Self::validate_config(&config.engine)?;
        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<StrataConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: StrataConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
        })?;

        Ok(Some(config))
    }

    /// Environment variables take precedence over config file values
    fn apply_env_overrides(config: &mut StrataConfig) {
        if let Ok(depth) = env::var("STRATA_MAX_CONTEXT_DEPTH") {
            if let Ok(depth) = depth.trim().parse::<usize>() {
                config.engine.max_context_depth = depth;
            }
        }

        if let Ok(max_operations) = env::var("STRATA_MAX_OPERATIONS") {
            if let Ok(max_operations) = max_operations.trim().parse::<u64>() {
                config.engine.max_operations = max_operations;
            }
        }
    }

    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "STRATA_MAX_CONTEXT_DEPTH - Override child output depth exposed to templates (default: 10)",
            "STRATA_MAX_OPERATIONS - Override the per-expression operation budget (default: 50000)",
            "STRATA_LOG_LEVEL - Override the default log level (default: info)",
            "STRATA_LOG_FORMAT - Override the log format (pretty/json)",
        ]
    }

    pub fn validate_config(config: &EngineConfig) -> Result<(), AppError> {
        if config.max_context_depth == 0 {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                "engine.max_context_depth must be at least 1",
            ));
        }

        if config.max_operations == 0 {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                "engine.max_operations must be greater than 0",
            ));
        }

        if config.default_item_var.trim().is_empty() || config.default_index_var.trim().is_empty() {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                "engine.default_item_var and engine.default_index_var cannot be empty",
            ));
        }

        if config.default_item_var == config.default_index_var {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                format!(
                    "engine.default_item_var and engine.default_index_var must differ (both '{}')",
                    config.default_item_var
                ),
            ));
        }

        Ok(())
    }
}
