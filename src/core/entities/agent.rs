use super::{deserialize_env, EnvMap, Input, MapConvertible, ToolConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<Input>,
    #[serde(
        default,
        deserialize_with = "deserialize_env",
        skip_serializing_if = "Option::is_none"
    )]
    pub env: Option<EnvMap>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentConfig {
    pub fn new<T: Into<String>>(id: T) -> Self {
        AgentConfig {
            id: id.into(),
            ..Default::default()
        }
    }

    /// A bare reference: no instructions and no actions of its own.
    pub fn is_incomplete(&self) -> bool {
        self.instructions.is_empty() && self.actions.is_empty()
    }

    pub fn find_action(&self, action_id: &str) -> Option<&ActionConfig> {
        self.actions.iter().find(|action| action.id == action_id)
    }

    pub fn find_action_mut(&mut self, action_id: &str) -> Option<&mut ActionConfig> {
        self.actions.iter_mut().find(|action| action.id == action_id)
    }
}

impl MapConvertible for AgentConfig {
    fn input(&self) -> Option<&Input> {
        self.with.as_ref()
    }

    fn set_input(&mut self, input: Input) {
        self.with = Some(input);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<Input>,
    /// Output schema; kept literal during normalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MapConvertible for ActionConfig {
    fn input(&self) -> Option<&Input> {
        self.with.as_ref()
    }

    fn set_input(&mut self, input: Input) {
        self.with = Some(input);
    }
}
