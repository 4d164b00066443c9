use super::{Input, Output};
use crate::core::types::{ExecutionType, StatusType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ExecutionError {
    pub fn new<T: Into<String>>(message: T) -> Self {
        ExecutionError {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Map form exposed to templates as `.error`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("message".to_string(), Value::String(self.message.clone()));
        if let Some(code) = &self.code {
            map.insert("code".to_string(), Value::String(code.clone()));
        }
        if let Some(details) = &self.details {
            map.insert("details".to_string(), details.clone());
        }
        Value::Object(map)
    }
}

/// Runtime record of one task execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: String,
    pub task_exec_id: String,
    /// Execution id of the task that spawned this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_state_id: Option<String>,
    #[serde(default)]
    pub execution_type: ExecutionType,
    #[serde(default)]
    pub status: StatusType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Input>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

impl TaskState {
    pub fn new<T: Into<String>, E: Into<String>>(task_id: T, task_exec_id: E) -> Self {
        TaskState {
            task_id: task_id.into(),
            task_exec_id: task_exec_id.into(),
            ..Default::default()
        }
    }

    pub fn can_have_children(&self) -> bool {
        matches!(
            self.execution_type,
            ExecutionType::Parallel | ExecutionType::Collection | ExecutionType::Composite
        )
    }
}

/// Runtime record of a workflow execution and its tasks, keyed by task id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: String,
    pub workflow_exec_id: String,
    #[serde(default)]
    pub status: StatusType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Input>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    #[serde(default)]
    pub tasks: IndexMap<String, TaskState>,
}

impl WorkflowState {
    pub fn new<T: Into<String>, E: Into<String>>(workflow_id: T, workflow_exec_id: E) -> Self {
        WorkflowState {
            workflow_id: workflow_id.into(),
            workflow_exec_id: workflow_exec_id.into(),
            ..Default::default()
        }
    }

    pub fn add_task(&mut self, state: TaskState) {
        self.tasks.insert(state.task_id.clone(), state);
    }
}
