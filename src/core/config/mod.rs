pub mod loader;

pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};

/// Configuration loaded from strata.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StrataConfig {
    /// Normalization engine configuration
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Normalization engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Nesting levels of child task output exposed to templates
    #[serde(default = "default_max_context_depth")]
    pub max_context_depth: usize,

    /// Variable name bound to the current collection item
    #[serde(default = "default_item_var")]
    pub default_item_var: String,

    /// Variable name bound to the current collection index
    #[serde(default = "default_index_var")]
    pub default_index_var: String,

    /// Operation budget per template expression
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_context_depth: default_max_context_depth(),
            default_item_var: default_item_var(),
            default_index_var: default_index_var(),
            max_operations: default_max_operations(),
        }
    }
}

// Default functions
fn default_max_context_depth() -> usize {
    10
}

fn default_item_var() -> String {
    "item".to_string()
}

fn default_index_var() -> String {
    "index".to_string()
}

fn default_max_operations() -> u64 {
    crate::core::expression::DEFAULT_MAX_OPERATIONS
}
