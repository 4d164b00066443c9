//! Utility helpers: environment layering and JSON/YAML file loading.
pub mod env;
pub mod serialization;

pub use env::EnvMerger;
pub use serialization::FileUtils;
pub use serialization::JsonSerializer;
pub use serialization::Serializer;
pub use serialization::YamlSerializer;
