use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

pub trait Serializer {
    fn serialize<T: serde::Serialize>(&self, data: &T) -> Result<Vec<u8>>;
    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T>;
}

pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T: serde::Serialize>(&self, data: &T) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(data).map_err(Into::into)
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        serde_json::from_slice(data).map_err(Into::into)
    }
}

pub struct YamlSerializer;

impl Serializer for YamlSerializer {
    fn serialize<T: serde::Serialize>(&self, data: &T) -> Result<Vec<u8>> {
        Ok(serde_yaml::to_string(data)?.into_bytes())
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        serde_yaml::from_slice(data).map_err(Into::into)
    }
}

pub struct FileUtils;

impl FileUtils {
    /// Load a JSON or YAML document, picking the format from the extension.
    pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let content =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let parsed = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => YamlSerializer.deserialize(&content),
            _ => JsonSerializer.deserialize(&content),
        };
        parsed.with_context(|| format!("failed to parse {}", path.display()))
    }
}
