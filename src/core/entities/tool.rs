use super::{deserialize_env, EnvMap, Input, MapConvertible};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub execute: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<Input>,
    #[serde(
        default,
        deserialize_with = "deserialize_env",
        skip_serializing_if = "Option::is_none"
    )]
    pub env: Option<EnvMap>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolConfig {
    pub fn new<T: Into<String>>(id: T) -> Self {
        ToolConfig {
            id: id.into(),
            ..Default::default()
        }
    }
}

impl MapConvertible for ToolConfig {
    fn input(&self) -> Option<&Input> {
        self.with.as_ref()
    }

    fn set_input(&mut self, input: Input) {
        self.with = Some(input);
    }
}
