#![allow(clippy::result_large_err)]

use super::filter::{is_truthy, to_sequence};
use super::merge_inputs;
use crate::core::config::EngineConfig;
use crate::core::entities::{AgentConfig, EnvMap, Input, TaskConfig, ToolConfig};
use crate::core::error::{self, AppError};
use crate::core::template::{value_to_text, TemplateEvaluator};
use crate::core::types::{ErrorCategory, StatusType};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Expands a collection task into one concrete child config per item.
pub struct CollectionExpander {
    evaluator: Arc<dyn TemplateEvaluator>,
    default_item_var: String,
    default_index_var: String,
}

/// Child task counts used to build the `progress` context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressInfo {
    pub total_children: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub running_count: usize,
    pub pending_count: usize,
    pub status_counts: BTreeMap<StatusType, usize>,
}

impl ProgressInfo {
    pub fn from_statuses<'s, I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = &'s StatusType>,
    {
        let mut info = ProgressInfo::default();
        for status in statuses {
            info.total_children += 1;
            *info.status_counts.entry(*status).or_default() += 1;
            match status {
                StatusType::Success => info.completed_count += 1,
                StatusType::Failed | StatusType::Canceled | StatusType::TimedOut => {
                    info.failed_count += 1
                }
                StatusType::Running | StatusType::Waiting | StatusType::Paused => {
                    info.running_count += 1
                }
                StatusType::Pending => info.pending_count += 1,
            }
        }
        info
    }

    pub fn completion_rate(&self) -> f64 {
        if self.total_children == 0 {
            return 0.0;
        }
        self.completed_count as f64 / self.total_children as f64
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total_children == 0 {
            return 0.0;
        }
        self.failed_count as f64 / self.total_children as f64
    }

    pub fn is_all_complete(&self) -> bool {
        self.completed_count + self.failed_count == self.total_children
    }

    pub fn overall_status(&self) -> StatusType {
        if self.total_children == 0 {
            StatusType::Pending
        } else if self.is_all_complete() {
            if self.failed_count > 0 {
                StatusType::Failed
            } else {
                StatusType::Success
            }
        } else if self.running_count > 0 || self.completed_count + self.failed_count > 0 {
            StatusType::Running
        } else {
            StatusType::Pending
        }
    }
}

impl CollectionExpander {
    pub fn new(evaluator: Arc<dyn TemplateEvaluator>, config: &EngineConfig) -> Self {
        CollectionExpander {
            evaluator,
            default_item_var: config.default_item_var.clone(),
            default_index_var: config.default_index_var.clone(),
        }
    }

    fn item_var<'c>(&'c self, config: &'c TaskConfig) -> &'c str {
        config.item_var().unwrap_or(self.default_item_var.as_str())
    }

    fn index_var<'c>(&'c self, config: &'c TaskConfig) -> &'c str {
        config.index_var().unwrap_or(self.default_index_var.as_str())
    }

    /// Items, filtered, then one child config per surviving item.
    pub fn expand(
        &self,
        config: &TaskConfig,
        context: &Map<String, Value>,
    ) -> Result<Vec<TaskConfig>, AppError> {
        let items = self.expand_items(config, context)?;
        let total = items.len();
        let items = self.filter_positions(config, items, context)?;
        debug!(
            task_id = %config.id,
            total,
            kept = items.len(),
            "expanding collection task"
        );
        self.create_children(config, &items, context)
    }

    pub fn expand_items(
        &self,
        config: &TaskConfig,
        context: &Map<String, Value>,
    ) -> Result<Vec<Value>, AppError> {
        let items = match &config.items {
            None | Some(Value::Null) => return Err(missing_items(config)),
            Some(Value::String(s)) if s.trim().is_empty() => return Err(missing_items(config)),
            Some(items) => items,
        };

        let resolved = match items {
            Value::String(s) if self.evaluator.has_template(s) => {
                let value = self.evaluator.parse_value(items, context).map_err(|e| {
                    e.wrap(format!(
                        "failed to evaluate items expression for task {}",
                        config.id
                    ))
                })?;
                parse_json_string(value)
            }
            Value::String(_) => parse_json_string(items.clone()),
            other => other.clone(),
        };
        Ok(to_sequence(resolved))
    }

    /// Keep items whose filter result is truthy, in original order.
    pub fn filter_items(
        &self,
        config: &TaskConfig,
        items: Vec<Value>,
        context: &Map<String, Value>,
    ) -> Result<Vec<Value>, AppError> {
        Ok(self
            .filter_positions(config, items, context)?
            .into_iter()
            .map(|(_, item)| item)
            .collect())
    }

    /// Surviving items paired with their position in the unfiltered sequence.
    fn filter_positions(
        &self,
        config: &TaskConfig,
        items: Vec<Value>,
        context: &Map<String, Value>,
    ) -> Result<Vec<(usize, Value)>, AppError> {
        let filter = match config.filter.as_deref().map(str::trim) {
            Some(filter) if !filter.is_empty() => filter,
            _ => return Ok(items.into_iter().enumerate().collect()),
        };

        let mut kept = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let item_context = self.create_item_context(context, config, &item, index);
            let result = if self.evaluator.has_template(filter) {
                self.evaluator
                    .parse_value(&Value::String(filter.to_string()), &item_context)
            } else {
                self.evaluator.evaluate_expression(filter, &item_context)
            };
            let result = result.map_err(|e| {
                e.with_code(error::FILTER_FAILED).wrap(format!(
                    "failed to evaluate filter expression for item {}",
                    index
                ))
            })?;
            if is_truthy(&result) {
                kept.push((index, item));
            }
        }
        Ok(kept)
    }

    /// Base context plus the configured item and index variables.
    pub fn create_item_context(
        &self,
        base: &Map<String, Value>,
        config: &TaskConfig,
        item: &Value,
        index: usize,
    ) -> Map<String, Value> {
        let mut context = base.clone();
        context.insert(self.item_var(config).to_string(), item.clone());
        context.insert(
            self.index_var(config).to_string(),
            Value::Number(Number::from(index)),
        );
        context
    }

    pub fn create_child_configs(
        &self,
        config: &TaskConfig,
        items: &[Value],
        context: &Map<String, Value>,
    ) -> Result<Vec<TaskConfig>, AppError> {
        let items: Vec<(usize, Value)> = items.iter().cloned().enumerate().collect();
        self.create_children(config, &items, context)
    }

    /// Children are indexed by position among the surviving items; errors also
    /// name the source position when filtering moved it.
    fn create_children(
        &self,
        config: &TaskConfig,
        items: &[(usize, Value)],
        context: &Map<String, Value>,
    ) -> Result<Vec<TaskConfig>, AppError> {
        if config.task.is_none() && config.tasks.is_empty() {
            return Err(missing_template(config));
        }
        let mut children = Vec::new();
        for (index, (source, item)) in items.iter().enumerate() {
            let item_context = self.create_item_context(context, config, item, index);
            let templates: Vec<(&TaskConfig, String)> = match config.task.as_deref() {
                Some(template) => vec![(template, format!("{}_item_{}", config.id, index))],
                None => config
                    .tasks
                    .iter()
                    .enumerate()
                    .map(|(task_index, template)| {
                        (template, format!("{}_item_{}_task_{}", config.id, index, task_index))
                    })
                    .collect(),
            };
            for (template, id) in templates {
                let child = self
                    .create_child(config, template, &item_context, item, index, id)
                    .map_err(|e| {
                        let location = if *source == index {
                            format!("item {}", index)
                        } else {
                            format!("item {} (source item {})", index, source)
                        };
                        e.with_code(error::CHILD_TEMPLATE_FAILED)
                            .wrap(format!("failed to create child config for {}", location))
                    })?;
                children.push(child);
            }
        }
        Ok(children)
    }

    fn create_child(
        &self,
        config: &TaskConfig,
        template: &TaskConfig,
        item_context: &Map<String, Value>,
        item: &Value,
        index: usize,
        id: String,
    ) -> Result<TaskConfig, AppError> {
        let mut child = template.clone();
        child.with = merge_inputs(config.with.as_ref(), template.with.as_ref());
        self.apply_template_to_config(&mut child, item_context)?;

        let mut with = child.with.take().unwrap_or_default();
        with.insert(self.item_var(config).to_string(), item.clone());
        with.insert(
            self.index_var(config).to_string(),
            Value::Number(Number::from(index)),
        );
        child.with = Some(with);
        child.id = id;

        if let Some(parent_agent) = &config.agent {
            let inherits = child.agent.as_ref().map(AgentConfig::is_incomplete).unwrap_or(false);
            if inherits && !parent_agent.is_incomplete() {
                let own_id = child.agent.as_ref().map(|a| a.id.clone()).unwrap_or_default();
                let mut agent = parent_agent.clone();
                if !own_id.is_empty() {
                    agent.id = own_id;
                }
                child.agent = Some(agent);
            }
        }
        Ok(child)
    }

    /// Template the fields of a child config that depend on the item.
    pub fn apply_template_to_config(
        &self,
        config: &mut TaskConfig,
        context: &Map<String, Value>,
    ) -> Result<(), AppError> {
        config.id = self
            .render(&config.id, context)
            .map_err(|e| e.wrap("failed to apply template to task id"))?;
        if let Some(action) = &config.action {
            config.action = Some(
                self.render(action, context)
                    .map_err(|e| e.wrap("failed to apply template to action"))?,
            );
        }
        if let Some(with) = &config.with {
            config.with = Some(
                self.template_map(with, context)
                    .map_err(|e| e.wrap("failed to apply template to with parameter"))?,
            );
        }
        if let Some(env) = &config.env {
            config.env = Some(
                self.template_env(env, context)
                    .map_err(|e| e.wrap("failed to apply template to env variables"))?,
            );
        }
        if let Some(agent) = config.agent.as_mut() {
            self.apply_template_to_agent(agent, context)
                .map_err(|e| e.wrap("failed to apply template to agent"))?;
        }
        if let Some(tool) = config.tool.as_mut() {
            self.apply_template_to_tool(tool, context)
                .map_err(|e| e.wrap("failed to apply template to tool"))?;
        }
        Ok(())
    }

    fn apply_template_to_agent(
        &self,
        agent: &mut AgentConfig,
        context: &Map<String, Value>,
    ) -> Result<(), AppError> {
        if !agent.instructions.is_empty() {
            agent.instructions = self
                .render(&agent.instructions, context)
                .map_err(|e| e.wrap("failed to apply template to agent instructions"))?;
        }
        for (i, action) in agent.actions.iter_mut().enumerate() {
            if !action.prompt.is_empty() {
                action.prompt = self
                    .render(&action.prompt, context)
                    .map_err(|e| e.wrap(format!("failed to apply template to action {} prompt", i)))?;
            }
            if let Some(with) = &action.with {
                action.with = Some(self.template_map(with, context).map_err(|e| {
                    e.wrap(format!("failed to apply template to action {} with parameter", i))
                })?);
            }
        }
        if let Some(with) = &agent.with {
            agent.with = Some(
                self.template_map(with, context)
                    .map_err(|e| e.wrap("failed to apply template to agent with parameter"))?,
            );
        }
        if let Some(env) = &agent.env {
            agent.env = Some(
                self.template_env(env, context)
                    .map_err(|e| e.wrap("failed to apply template to agent env variables"))?,
            );
        }
        Ok(())
    }

    fn apply_template_to_tool(
        &self,
        tool: &mut ToolConfig,
        context: &Map<String, Value>,
    ) -> Result<(), AppError> {
        if !tool.description.is_empty() {
            tool.description = self
                .render(&tool.description, context)
                .map_err(|e| e.wrap("failed to apply template to tool description"))?;
        }
        if !tool.execute.is_empty() {
            tool.execute = self
                .render(&tool.execute, context)
                .map_err(|e| e.wrap("failed to apply template to tool execute"))?;
        }
        if let Some(with) = &tool.with {
            tool.with = Some(
                self.template_map(with, context)
                    .map_err(|e| e.wrap("failed to apply template to tool with parameter"))?,
            );
        }
        if let Some(env) = &tool.env {
            tool.env = Some(
                self.template_env(env, context)
                    .map_err(|e| e.wrap("failed to apply template to tool env variables"))?,
            );
        }
        Ok(())
    }

    fn render(&self, text: &str, context: &Map<String, Value>) -> Result<String, AppError> {
        self.evaluator.render_string(text, context)
    }

    fn template_map(&self, map: &Input, context: &Map<String, Value>) -> Result<Input, AppError> {
        self.evaluator.parse_map_with_filter(map, context, &|_| false)
    }

    fn template_env(&self, env: &EnvMap, context: &Map<String, Value>) -> Result<EnvMap, AppError> {
        let mut out = EnvMap::new();
        for (key, value) in env {
            let rendered = self
                .evaluator
                .parse_value(&Value::String(value.clone()), context)
                .map_err(|e| e.wrap(format!("env {}", key)))?;
            out.insert(key.clone(), value_to_text(&rendered));
        }
        Ok(out)
    }

    /// Adds `progress` and its `summary` alias to a base context.
    pub fn create_progress_context(
        &self,
        base: &Map<String, Value>,
        progress: &ProgressInfo,
    ) -> Map<String, Value> {
        let status_counts: Map<String, Value> = progress
            .status_counts
            .iter()
            .map(|(status, count)| (status.to_string(), Value::from(*count)))
            .collect();

        let mut info = Map::new();
        info.insert("total_children".to_string(), Value::from(progress.total_children));
        info.insert("completed_count".to_string(), Value::from(progress.completed_count));
        info.insert("failed_count".to_string(), Value::from(progress.failed_count));
        info.insert("running_count".to_string(), Value::from(progress.running_count));
        info.insert("pending_count".to_string(), Value::from(progress.pending_count));
        info.insert("completion_rate".to_string(), Value::from(progress.completion_rate()));
        info.insert("failure_rate".to_string(), Value::from(progress.failure_rate()));
        info.insert(
            "overall_status".to_string(),
            Value::String(progress.overall_status().to_string()),
        );
        info.insert("status_counts".to_string(), Value::Object(status_counts));
        info.insert("has_failures".to_string(), Value::Bool(progress.failed_count > 0));
        info.insert("is_all_complete".to_string(), Value::Bool(progress.is_all_complete()));

        let mut context = base.clone();
        context.insert("progress".to_string(), Value::Object(info.clone()));
        context.insert("summary".to_string(), Value::Object(info));
        context
    }
}

fn missing_items(config: &TaskConfig) -> AppError {
    AppError::new(
        ErrorCategory::InputError,
        format!("items field is required for collection task {}", config.id),
    )
    .with_code(error::MISSING_ITEMS)
    .with_context("task_id", config.id.clone())
}

fn missing_template(config: &TaskConfig) -> AppError {
    AppError::new(
        ErrorCategory::InputError,
        format!("collection task {} requires a task or tasks template", config.id),
    )
    .with_code(error::MISSING_FIELD)
    .with_context("task_id", config.id.clone())
}

/// Strings holding JSON arrays or maps are decoded; anything else stays as is.
fn parse_json_string(value: Value) -> Value {
    match value {
        Value::String(s) => match serde_json::from_str::<Value>(s.trim()) {
            Ok(parsed @ (Value::Array(_) | Value::Object(_))) => parsed,
            _ => Value::String(s),
        },
        other => other,
    }
}
