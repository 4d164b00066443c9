pub mod config;
pub mod entities;
pub mod error;
pub mod expression;
pub mod normalizer;
pub mod template;
pub mod types;

pub use config::{ConfigLoader, EngineConfig, StrataConfig};
pub use entities::{
    ActionConfig, AgentConfig, EnvMap, ErrorTransition, ExecutionError, Input, MapConvertible,
    ModelConfig, Output, SuccessTransition, TaskConfig, TaskState, ToolConfig, WorkflowConfig,
    WorkflowState,
};
pub use error::AppError;
pub use expression::ExpressionEngine;
pub use normalizer::{
    CollectionExpander, ConfigNormalizer, ContextBuilder, NormalizationContext, Normalizer,
    ParentSource, ProgressInfo, TaskConfigs,
};
pub use template::{TemplateEngine, TemplateEvaluator};
pub use types::*;
