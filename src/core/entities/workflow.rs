use super::{deserialize_env, EnvMap, Input, MapConvertible, TaskConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_env",
        skip_serializing_if = "Option::is_none"
    )]
    pub env: Option<EnvMap>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Input>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkflowConfig {
    pub fn new<T: Into<String>>(id: T) -> Self {
        WorkflowConfig {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Top-level task by id.
    pub fn task(&self, task_id: &str) -> Option<&TaskConfig> {
        self.tasks.iter().find(|task| task.id == task_id)
    }
}

impl MapConvertible for WorkflowConfig {}
