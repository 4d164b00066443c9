#![allow(clippy::result_large_err)]

mod agent;
mod state;
mod task;
mod tool;
mod workflow;

pub use agent::{ActionConfig, AgentConfig, ModelConfig};
pub use state::{ExecutionError, TaskState, WorkflowState};
pub use task::{ErrorTransition, SuccessTransition, TaskConfig};
pub use tool::ToolConfig;
pub use workflow::WorkflowConfig;

use crate::core::error::{self, AppError};
use crate::core::types::ErrorCategory;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Input parameters of a task, agent, action or tool.
pub type Input = Map<String, Value>;
pub type Output = Map<String, Value>;
pub type EnvMap = BTreeMap<String, String>;

/// Generic map round trip used to template arbitrary configuration.
pub trait MapConvertible: Serialize + DeserializeOwned {
    fn as_map(&self) -> Result<Map<String, Value>, AppError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(AppError::new(
                ErrorCategory::InputError,
                format!("configuration serialized to {} instead of a map", kind_of(&other)),
            )
            .with_code(error::AS_MAP_FAILED)),
            Err(e) => Err(AppError::new(
                ErrorCategory::InputError,
                format!("failed to convert configuration to map: {}", e),
            )
            .with_code(error::AS_MAP_FAILED)),
        }
    }

    /// Replace `self` with the configuration decoded from `map`.
    fn from_map(&mut self, map: Map<String, Value>) -> Result<(), AppError>
    where
        Self: Sized,
    {
        *self = serde_json::from_value(Value::Object(map)).map_err(|e| {
            AppError::new(
                ErrorCategory::ConversionError,
                format!("failed to convert map to configuration: {}", e),
            )
            .with_code(error::FROM_MAP_FAILED)
        })?;
        Ok(())
    }

    fn input(&self) -> Option<&Input> {
        None
    }

    fn set_input(&mut self, _input: Input) {}
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

/// Environment values may come back from templating as numbers or booleans.
pub(crate) fn deserialize_env<'de, D>(deserializer: D) -> Result<Option<EnvMap>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|map| {
        map.into_iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (key, text)
            })
            .collect()
    }))
}
