#![allow(clippy::result_large_err)]

//! Template normalization of task, agent, action, tool and transition configs.

pub mod children;
pub mod collection;
pub mod context;
pub mod facade;
pub mod filter;

pub use children::ChildrenIndex;
pub use collection::{CollectionExpander, ProgressInfo};
pub use context::{ContextBuilder, NormalizationContext, ParentSource, TaskConfigs};
pub use facade::{build_task_configs_map, ConfigNormalizer};
pub use filter::{is_truthy, to_sequence};

use crate::core::config::EngineConfig;
use crate::core::entities::{
    ActionConfig, AgentConfig, ErrorTransition, Input, MapConvertible, SuccessTransition,
    TaskConfig, ToolConfig,
};
use crate::core::error::{self, AppError};
use crate::core::template::{TemplateEngine, TemplateEvaluator};
use crate::core::types::{ErrorCategory, TaskType};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Keys never templated while normalizing a task's own fields.
const TASK_LITERAL_KEYS: &[&str] = &["outputs", "actions", "tools", "on_success", "on_error"];
const NESTED_TASK_KEYS: &[&str] = &["tasks", "task"];
const COLLECTION_KEYS: &[&str] = &["filter", "items"];
const AGENT_LITERAL_KEYS: &[&str] = &["actions", "tools", "output", "outputs"];
const ACTION_LITERAL_KEYS: &[&str] = &["output", "outputs"];

pub struct Normalizer {
    evaluator: Arc<dyn TemplateEvaluator>,
    builder: ContextBuilder,
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer::from_config(&EngineConfig::default())
    }
}

impl Normalizer {
    pub fn new(evaluator: Arc<dyn TemplateEvaluator>, builder: ContextBuilder) -> Self {
        Normalizer { evaluator, builder }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Normalizer::new(
            Arc::new(TemplateEngine::with_max_operations(config.max_operations)),
            ContextBuilder::new(config.max_context_depth),
        )
    }

    pub fn evaluator(&self) -> &Arc<dyn TemplateEvaluator> {
        &self.evaluator
    }

    pub fn builder(&self) -> &ContextBuilder {
        &self.builder
    }

    pub fn build_context(&self, ctx: &NormalizationContext<'_>) -> Map<String, Value> {
        self.builder.build(ctx)
    }

    pub fn normalize_task(
        &self,
        config: &mut TaskConfig,
        ctx: &mut NormalizationContext<'_>,
    ) -> Result<(), AppError> {
        debug!(task_id = %config.id, task_type = ?config.task_type, "normalizing task");
        let task_type = config.task_type;
        let skip = move |key: &str| {
            TASK_LITERAL_KEYS.contains(&key)
                || (task_type.nests_tasks() && NESTED_TASK_KEYS.contains(&key))
                || (task_type == TaskType::Collection && COLLECTION_KEYS.contains(&key))
        };
        self.normalize_config(config, ctx, &skip)
            .map_err(|e| e.wrap(format!("failed to normalize task {}", config.id)))?;

        if task_type == TaskType::Parallel {
            self.normalize_sub_tasks(config, ctx)?;
        }
        Ok(())
    }

    /// Normalize a signal-triggered task with `.signal` exposed to templates.
    pub fn normalize_task_with_signal(
        &self,
        config: &mut TaskConfig,
        ctx: &mut NormalizationContext<'_>,
        signal_id: &str,
        payload: Value,
    ) -> Result<(), AppError> {
        let mut signal = Map::new();
        signal.insert("id".to_string(), Value::String(signal_id.to_string()));
        signal.insert("payload".to_string(), payload);
        ctx.variables.insert("signal".to_string(), Value::Object(signal));
        self.normalize_task(config, ctx)
    }

    /// Each sub-task sees the parallel task itself as `.parent`.
    fn normalize_sub_tasks(
        &self,
        config: &mut TaskConfig,
        ctx: &NormalizationContext<'_>,
    ) -> Result<(), AppError> {
        let mut parent = config.as_map()?;
        if let Some(state) = ctx.task_state(&config.id) {
            context::overlay_runtime(&mut parent, state);
        }

        for sub_task in config.tasks.iter_mut() {
            let mut sub_ctx = ctx.derive(ParentSource::Config(parent.clone()), sub_task.with.clone());
            self.normalize_task(sub_task, &mut sub_ctx)
                .map_err(|e| e.wrap(format!("failed to normalize sub-task {}", sub_task.id)))?;
        }

        if let Some(template) = config.task.as_deref_mut() {
            let mut sub_ctx = ctx.derive(ParentSource::Config(parent), template.with.clone());
            self.normalize_task(template, &mut sub_ctx)
                .map_err(|e| e.wrap(format!("failed to normalize task template {}", template.id)))?;
        }
        Ok(())
    }

    /// Normalize an agent, then the named action and the attached tools.
    pub fn normalize_agent(
        &self,
        agent: &mut AgentConfig,
        ctx: &mut NormalizationContext<'_>,
        action_id: Option<&str>,
    ) -> Result<(), AppError> {
        debug!(agent_id = %agent.id, action_id = ?action_id, "normalizing agent");
        let skip = |key: &str| AGENT_LITERAL_KEYS.contains(&key);
        self.normalize_config(agent, ctx, &skip)
            .map_err(|e| e.wrap(format!("failed to normalize agent {}", agent.id)))?;

        let parent = agent_parent(agent);

        if let Some(action_id) = action_id.filter(|id| !id.is_empty()) {
            let agent_input = agent.with.clone();
            let agent_id = agent.id.clone();
            let action = agent.find_action_mut(action_id).ok_or_else(|| {
                AppError::new(
                    ErrorCategory::InputError,
                    format!("action {} not found in agent {}", action_id, agent_id),
                )
                .with_code(error::UNKNOWN_ACTION)
            })?;
            action.with = merge_inputs(agent_input.as_ref(), action.with.as_ref());
            let mut action_ctx = ctx.derive(ParentSource::Config(parent.clone()), action.with.clone());
            self.normalize_action(action, &mut action_ctx)
                .map_err(|e| e.wrap(format!("failed to normalize action {}", action_id)))?;
        }

        for tool in agent.tools.iter_mut() {
            let mut tool_ctx = ctx.derive(ParentSource::Config(parent.clone()), tool.with.clone());
            self.normalize_tool(tool, &mut tool_ctx)
                .map_err(|e| e.wrap(format!("failed to normalize agent tool {}", tool.id)))?;
        }
        Ok(())
    }

    pub fn normalize_action(
        &self,
        action: &mut ActionConfig,
        ctx: &mut NormalizationContext<'_>,
    ) -> Result<(), AppError> {
        let skip = |key: &str| ACTION_LITERAL_KEYS.contains(&key);
        self.normalize_config(action, ctx, &skip)
    }

    pub fn normalize_tool(
        &self,
        tool: &mut ToolConfig,
        ctx: &mut NormalizationContext<'_>,
    ) -> Result<(), AppError> {
        debug!(tool_id = %tool.id, "normalizing tool");
        let skip = |key: &str| ACTION_LITERAL_KEYS.contains(&key);
        self.normalize_config(tool, ctx, &skip)
            .map_err(|e| e.wrap(format!("failed to normalize tool {}", tool.id)))
    }

    pub fn normalize_success_transition(
        &self,
        transition: &mut SuccessTransition,
        ctx: &mut NormalizationContext<'_>,
    ) -> Result<(), AppError> {
        self.normalize_config(transition, ctx, &|_| false)
            .map_err(|e| e.wrap("failed to normalize success transition"))
    }

    pub fn normalize_error_transition(
        &self,
        transition: &mut ErrorTransition,
        ctx: &mut NormalizationContext<'_>,
    ) -> Result<(), AppError> {
        self.normalize_config(transition, ctx, &|_| false)
            .map_err(|e| e.wrap("failed to normalize error transition"))
    }

    fn normalize_config<C: MapConvertible>(
        &self,
        config: &mut C,
        ctx: &mut NormalizationContext<'_>,
        skip: &dyn Fn(&str) -> bool,
    ) -> Result<(), AppError> {
        if ctx.current_input.is_none() {
            ctx.current_input = config.input().cloned();
        }
        let context = self.builder.build(ctx);
        let existing_input = config.input().cloned();

        let map = config.as_map()?;
        let parsed = self.evaluator.parse_map_with_filter(&map, &context, skip)?;
        config.from_map(parsed)?;

        if let Some(existing) = existing_input {
            let merged = merge_inputs(Some(&existing), config.input());
            if let Some(merged) = merged {
                config.set_input(merged);
            }
        }
        Ok(())
    }
}

/// `base` overlaid by `overlay`; `None` when both are absent.
pub(crate) fn merge_inputs(base: Option<&Input>, overlay: Option<&Input>) -> Option<Input> {
    match (base, overlay) {
        (None, None) => None,
        (base, overlay) => {
            let mut merged = base.cloned().unwrap_or_default();
            if let Some(overlay) = overlay {
                for (key, value) in overlay {
                    merged.insert(key.clone(), value.clone());
                }
            }
            Some(merged)
        }
    }
}

/// Parent seen by actions and tools of an agent.
fn agent_parent(agent: &AgentConfig) -> Map<String, Value> {
    let mut parent = Map::new();
    parent.insert("id".to_string(), Value::String(agent.id.clone()));
    parent.insert(
        "input".to_string(),
        agent.with.clone().map(Value::Object).unwrap_or(Value::Null),
    );
    parent.insert(
        "instructions".to_string(),
        Value::String(agent.instructions.clone()),
    );
    let config = agent
        .model
        .as_ref()
        .map(|model| Value::Object(model.config.clone()))
        .unwrap_or_else(|| Value::Object(Map::new()));
    parent.insert("config".to_string(), config);
    parent
}
