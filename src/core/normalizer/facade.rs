#![allow(clippy::result_large_err)]

use super::collection::CollectionExpander;
use super::context::{NormalizationContext, ParentSource, TaskConfigs};
use super::{merge_inputs, Normalizer};
use crate::core::config::EngineConfig;
use crate::core::entities::{
    AgentConfig, EnvMap, ErrorTransition, Input, MapConvertible, Output, SuccessTransition,
    TaskConfig, ToolConfig, WorkflowConfig, WorkflowState,
};
use crate::core::error::AppError;
use crate::core::template::TemplateEvaluator;
use crate::core::types::TaskType;
use crate::utils::EnvMerger;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error};

/// Task configurations keyed by id.
pub fn build_task_configs_map(tasks: &[TaskConfig]) -> TaskConfigs<'_> {
    tasks
        .iter()
        .map(|task| (task.id.clone(), task))
        .collect()
}

/// Merges environment layers and drives the [`Normalizer`] per config kind.
pub struct ConfigNormalizer {
    normalizer: Normalizer,
    expander: CollectionExpander,
}

impl Default for ConfigNormalizer {
    fn default() -> Self {
        ConfigNormalizer::new(&EngineConfig::default())
    }
}

impl ConfigNormalizer {
    pub fn new(config: &EngineConfig) -> Self {
        let normalizer = Normalizer::from_config(config);
        let expander = CollectionExpander::new(Arc::clone(normalizer.evaluator()), config);
        ConfigNormalizer {
            normalizer,
            expander,
        }
    }

    pub fn with_evaluator(evaluator: Arc<dyn TemplateEvaluator>, config: &EngineConfig) -> Self {
        let normalizer = Normalizer::new(
            Arc::clone(&evaluator),
            super::ContextBuilder::new(config.max_context_depth),
        );
        ConfigNormalizer {
            normalizer,
            expander: CollectionExpander::new(evaluator, config),
        }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn expander(&self) -> &CollectionExpander {
        &self.expander
    }

    /// Merge workflow and task env, then normalize the task in place.
    pub fn normalize_task(
        &self,
        workflow_state: &WorkflowState,
        workflow_config: &WorkflowConfig,
        task_config: &mut TaskConfig,
    ) -> Result<EnvMap, AppError> {
        let merged_env =
            EnvMerger::merge_with_defaults(workflow_config.env.as_ref(), task_config.env.as_ref());
        let task_configs = build_task_configs_map(&workflow_config.tasks);
        let mut ctx = NormalizationContext::new(workflow_state, workflow_config, &task_configs)
            .with_parent(ParentSource::Config(workflow_parent(workflow_state)))
            .with_env(merged_env.clone());
        task_config.env = Some(merged_env.clone());

        self.normalizer
            .normalize_task(task_config, &mut ctx)
            .map_err(|e| {
                error!(task_id = %task_config.id, error = %e, "task normalization failed");
                e.wrap(format!("failed to normalize task config for {}", task_config.id))
            })?;
        Ok(task_config.env.clone().unwrap_or_default())
    }

    /// Merge workflow, task and agent env, then normalize the agent and the task's action.
    pub fn normalize_agent_component(
        &self,
        workflow_state: &WorkflowState,
        workflow_config: &WorkflowConfig,
        task_config: &TaskConfig,
        agent_config: &mut AgentConfig,
        task_configs: &TaskConfigs<'_>,
    ) -> Result<EnvMap, AppError> {
        let merged_env = EnvMerger::merge_three_levels(
            workflow_config.env.as_ref(),
            task_config.env.as_ref(),
            agent_config.env.as_ref(),
        );
        agent_config.with = merge_inputs(task_config.with.as_ref(), agent_config.with.as_ref());
        agent_config.env = Some(merged_env.clone());

        let mut ctx = NormalizationContext::new(workflow_state, workflow_config, task_configs)
            .with_parent(ParentSource::Config(component_parent(workflow_state, task_config)?))
            .with_input(agent_config.with.clone())
            .with_env(merged_env.clone());
        self.normalizer
            .normalize_agent(agent_config, &mut ctx, task_config.action.as_deref())
            .map_err(|e| e.wrap(format!("failed to normalize agent config for {}", agent_config.id)))?;
        Ok(agent_config.env.clone().unwrap_or_default())
    }

    /// Merge workflow, task and tool env, then normalize the tool.
    pub fn normalize_tool_component(
        &self,
        workflow_state: &WorkflowState,
        workflow_config: &WorkflowConfig,
        task_config: &TaskConfig,
        tool_config: &mut ToolConfig,
        task_configs: &TaskConfigs<'_>,
    ) -> Result<EnvMap, AppError> {
        let merged_env = EnvMerger::merge_three_levels(
            workflow_config.env.as_ref(),
            task_config.env.as_ref(),
            tool_config.env.as_ref(),
        );
        tool_config.with = merge_inputs(task_config.with.as_ref(), tool_config.with.as_ref());
        tool_config.env = Some(merged_env.clone());

        let mut ctx = NormalizationContext::new(workflow_state, workflow_config, task_configs)
            .with_parent(ParentSource::Config(component_parent(workflow_state, task_config)?))
            .with_input(tool_config.with.clone())
            .with_env(merged_env.clone());
        self.normalizer
            .normalize_tool(tool_config, &mut ctx)
            .map_err(|e| e.wrap(format!("failed to normalize tool config for {}", tool_config.id)))?;
        Ok(tool_config.env.clone().unwrap_or_default())
    }

    pub fn normalize_success_transition(
        &self,
        transition: &mut SuccessTransition,
        workflow_state: &WorkflowState,
        workflow_config: &WorkflowConfig,
        task_configs: &TaskConfigs<'_>,
        merged_env: Option<&EnvMap>,
    ) -> Result<(), AppError> {
        let mut ctx = self.transition_context(
            workflow_state,
            workflow_config,
            task_configs,
            merged_env,
            transition.with.clone(),
        )?;
        self.normalizer.normalize_success_transition(transition, &mut ctx)
    }

    pub fn normalize_error_transition(
        &self,
        transition: &mut ErrorTransition,
        workflow_state: &WorkflowState,
        workflow_config: &WorkflowConfig,
        task_configs: &TaskConfigs<'_>,
        merged_env: Option<&EnvMap>,
    ) -> Result<(), AppError> {
        let mut ctx = self.transition_context(
            workflow_state,
            workflow_config,
            task_configs,
            merged_env,
            transition.with.clone(),
        )?;
        self.normalizer.normalize_error_transition(transition, &mut ctx)
    }

    fn transition_context<'a>(
        &self,
        workflow_state: &'a WorkflowState,
        workflow_config: &'a WorkflowConfig,
        task_configs: &'a TaskConfigs<'a>,
        merged_env: Option<&EnvMap>,
        input: Option<Input>,
    ) -> Result<NormalizationContext<'a>, AppError> {
        let parent = workflow_config_parent(workflow_state, workflow_config)?;
        let mut ctx = NormalizationContext::new(workflow_state, workflow_config, task_configs)
            .with_parent(ParentSource::Config(parent))
            .with_input(input);
        ctx.merged_env = merged_env.cloned();
        Ok(ctx)
    }

    /// Evaluate a task's `outputs` mapping against its runtime output.
    ///
    /// Collection and parallel tasks see the aggregated `outputs` map as
    /// `.output` and their children as `.children`.
    pub fn normalize_task_output(
        &self,
        task_output: &Output,
        outputs_config: Option<&Input>,
        workflow_state: &WorkflowState,
        workflow_config: &WorkflowConfig,
        task_config: &TaskConfig,
    ) -> Result<Output, AppError> {
        let Some(outputs_config) = outputs_config else {
            return Ok(task_output.clone());
        };

        let task_configs = build_task_configs_map(&workflow_config.tasks);
        let mut ctx = NormalizationContext::new(workflow_state, workflow_config, &task_configs)
            .with_input(task_config.with.clone());
        ctx.merged_env = task_config.env.clone();
        let mut context = self.normalizer.build_context(&ctx);

        if matches!(task_config.task_type, TaskType::Collection | TaskType::Parallel) {
            let nested = task_output
                .get("outputs")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));
            context.insert("output".to_string(), nested);
            if let Some(state) = workflow_state.tasks.get(&task_config.id) {
                if state.can_have_children() {
                    let children = self.normalizer.builder().children_context(&ctx, state, 0);
                    context.insert("children".to_string(), Value::Object(children));
                }
            }
        } else {
            context.insert("output".to_string(), Value::Object(task_output.clone()));
        }

        self.transform_output_fields(outputs_config, &context, "task")
    }

    /// Evaluate the workflow `outputs` mapping once the workflow has finished.
    pub fn normalize_workflow_output(
        &self,
        workflow_state: &WorkflowState,
        workflow_config: &WorkflowConfig,
        outputs_config: Option<&Output>,
    ) -> Result<Option<Output>, AppError> {
        let Some(outputs_config) = outputs_config else {
            return Ok(None);
        };
        if outputs_config.is_empty() {
            return Ok(Some(Output::new()));
        }

        let parent = workflow_config_parent(workflow_state, workflow_config)?;
        let task_configs = build_task_configs_map(&workflow_config.tasks);
        let ctx = NormalizationContext::new(workflow_state, workflow_config, &task_configs)
            .with_parent(ParentSource::Config(parent))
            .with_input(workflow_state.input.clone())
            .with_env(workflow_config.env.clone().unwrap_or_default());
        let mut context = self.normalizer.build_context(&ctx);
        context.insert(
            "status".to_string(),
            Value::String(workflow_state.status.to_string()),
        );
        context.insert(
            "workflow_id".to_string(),
            Value::String(workflow_state.workflow_id.clone()),
        );
        context.insert(
            "workflow_exec_id".to_string(),
            Value::String(workflow_state.workflow_exec_id.clone()),
        );
        if let Some(err) = &workflow_state.error {
            context.insert("error".to_string(), err.to_value());
        }

        debug!(
            workflow_id = %workflow_state.workflow_id,
            task_count = workflow_state.tasks.len(),
            output_fields = outputs_config.len(),
            "transforming workflow output"
        );
        let output = self
            .transform_output_fields(outputs_config, &context, "workflow")
            .map_err(|e| {
                error!(workflow_id = %workflow_state.workflow_id, error = %e, "workflow output transformation failed");
                e
            })?;
        Ok(Some(output))
    }

    /// Merge workflow and task env without templating.
    pub fn normalize_task_environment(
        &self,
        workflow_config: &WorkflowConfig,
        task_config: &mut TaskConfig,
    ) -> EnvMap {
        let merged =
            EnvMerger::merge_with_defaults(workflow_config.env.as_ref(), task_config.env.as_ref());
        task_config.env = Some(merged.clone());
        merged
    }

    /// Expand a collection task into child configs, evaluated against the
    /// task's context with the workflow as parent.
    pub fn expand_collection(
        &self,
        workflow_state: &WorkflowState,
        workflow_config: &WorkflowConfig,
        task_config: &TaskConfig,
    ) -> Result<Vec<TaskConfig>, AppError> {
        let merged_env =
            EnvMerger::merge_with_defaults(workflow_config.env.as_ref(), task_config.env.as_ref());
        let task_configs = build_task_configs_map(&workflow_config.tasks);
        let ctx = NormalizationContext::new(workflow_state, workflow_config, &task_configs)
            .with_parent(ParentSource::Config(workflow_parent(workflow_state)))
            .with_input(task_config.with.clone())
            .with_env(merged_env);
        let context = self.normalizer.build_context(&ctx);
        self.expander
            .expand(task_config, &context)
            .map_err(|e| e.wrap(format!("failed to expand collection task {}", task_config.id)))
    }

    /// Keys are processed in sorted order.
    fn transform_output_fields(
        &self,
        outputs_config: &Map<String, Value>,
        context: &Map<String, Value>,
        scope: &str,
    ) -> Result<Output, AppError> {
        let mut keys: Vec<&String> = outputs_config.keys().collect();
        keys.sort();
        let mut result = Output::new();
        for key in keys {
            let transformed = self
                .normalizer
                .evaluator()
                .parse_value(&outputs_config[key.as_str()], context)
                .map_err(|e| e.wrap(format!("failed to transform {} output field {}", scope, key)))?;
            result.insert(key.clone(), transformed);
        }
        Ok(result)
    }
}

/// `{id, input, output}` of the running workflow.
fn workflow_parent(workflow_state: &WorkflowState) -> Map<String, Value> {
    let mut parent = Map::new();
    parent.insert(
        "id".to_string(),
        Value::String(workflow_state.workflow_id.clone()),
    );
    parent.insert(
        "input".to_string(),
        workflow_state.input.clone().map(Value::Object).unwrap_or(Value::Null),
    );
    parent.insert(
        "output".to_string(),
        workflow_state.output.clone().map(Value::Object).unwrap_or(Value::Null),
    );
    parent
}

/// Workflow config properties with the runtime input and output.
fn workflow_config_parent(
    workflow_state: &WorkflowState,
    workflow_config: &WorkflowConfig,
) -> Result<Map<String, Value>, AppError> {
    let mut parent = workflow_config.as_map()?;
    parent.insert(
        "input".to_string(),
        workflow_state.input.clone().map(Value::Object).unwrap_or(Value::Null),
    );
    parent.insert(
        "output".to_string(),
        workflow_state.output.clone().map(Value::Object).unwrap_or(Value::Null),
    );
    Ok(parent)
}

/// Owning task config with its runtime input and output.
fn component_parent(
    workflow_state: &WorkflowState,
    task_config: &TaskConfig,
) -> Result<Map<String, Value>, AppError> {
    let mut parent = task_config.as_map()?;
    if let Some(state) = workflow_state.tasks.get(&task_config.id) {
        parent.insert(
            "input".to_string(),
            state.input.clone().map(Value::Object).unwrap_or(Value::Null),
        );
        parent.insert(
            "output".to_string(),
            state.output.clone().map(Value::Object).unwrap_or(Value::Null),
        );
    }
    Ok(parent)
}
