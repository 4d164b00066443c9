use super::{deserialize_env, AgentConfig, EnvMap, Input, MapConvertible, ToolConfig};
use crate::core::types::TaskType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub task_type: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<Input>,
    #[serde(
        default,
        deserialize_with = "deserialize_env",
        skip_serializing_if = "Option::is_none"
    )]
    pub env: Option<EnvMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolConfig>,
    /// Output mapping evaluated after the task runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Input>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskConfig>,
    /// Single task template for collection and parallel tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Box<TaskConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_var: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_var: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<SuccessTransition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<ErrorTransition>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskConfig {
    pub fn new<T: Into<String>>(id: T) -> Self {
        TaskConfig {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn of_type<T: Into<String>>(id: T, task_type: TaskType) -> Self {
        TaskConfig {
            id: id.into(),
            task_type,
            ..Default::default()
        }
    }

    pub fn item_var(&self) -> Option<&str> {
        self.item_var.as_deref().filter(|v| !v.is_empty())
    }

    pub fn index_var(&self) -> Option<&str> {
        self.index_var.as_deref().filter(|v| !v.is_empty())
    }
}

impl MapConvertible for TaskConfig {
    fn input(&self) -> Option<&Input> {
        self.with.as_ref()
    }

    fn set_input(&mut self, input: Input) {
        self.with = Some(input);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuccessTransition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<Input>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorTransition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<Input>,
}

impl MapConvertible for SuccessTransition {
    fn input(&self) -> Option<&Input> {
        self.with.as_ref()
    }

    fn set_input(&mut self, input: Input) {
        self.with = Some(input);
    }
}

impl MapConvertible for ErrorTransition {
    fn input(&self) -> Option<&Input> {
        self.with.as_ref()
    }

    fn set_input(&mut self, input: Input) {
        self.with = Some(input);
    }
}
