use crate::core::entities::{
    EnvMap, Input, MapConvertible, TaskConfig, TaskState, WorkflowConfig, WorkflowState,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::children::ChildrenIndex;

/// Task configurations by id.
pub type TaskConfigs<'a> = HashMap<String, &'a TaskConfig>;

/// Where the `.parent` of a context comes from.
#[derive(Debug, Clone)]
pub enum ParentSource<'a> {
    /// A ready-made parent map.
    Config(Map<String, Value>),
    /// A task configuration, overlaid with its runtime state when one exists.
    Task(&'a TaskConfig),
}

/// Inputs for one normalization call, threaded into recursive sub-calls.
#[derive(Debug, Clone)]
pub struct NormalizationContext<'a> {
    pub workflow_state: &'a WorkflowState,
    pub workflow_config: &'a WorkflowConfig,
    pub task_configs: &'a TaskConfigs<'a>,
    pub parent: Option<ParentSource<'a>>,
    pub current_input: Option<Input>,
    pub merged_env: Option<EnvMap>,
    /// Extra top-level variables such as `signal`, merged in last.
    pub variables: Map<String, Value>,
    children_index: Arc<ChildrenIndex>,
}

impl<'a> NormalizationContext<'a> {
    pub fn new(
        workflow_state: &'a WorkflowState,
        workflow_config: &'a WorkflowConfig,
        task_configs: &'a TaskConfigs<'a>,
    ) -> Self {
        NormalizationContext {
            workflow_state,
            workflow_config,
            task_configs,
            parent: None,
            current_input: None,
            merged_env: None,
            variables: Map::new(),
            children_index: Arc::new(ChildrenIndex::build(workflow_state)),
        }
    }

    pub fn with_parent(mut self, parent: ParentSource<'a>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_input(mut self, input: Option<Input>) -> Self {
        self.current_input = input;
        self
    }

    pub fn with_env(mut self, env: EnvMap) -> Self {
        self.merged_env = Some(env);
        self
    }

    pub fn with_variable<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    /// Sub-context sharing state, index, env and variables with a new parent and input.
    pub fn derive(&self, parent: ParentSource<'a>, input: Option<Input>) -> Self {
        NormalizationContext {
            workflow_state: self.workflow_state,
            workflow_config: self.workflow_config,
            task_configs: self.task_configs,
            parent: Some(parent),
            current_input: input,
            merged_env: self.merged_env.clone(),
            variables: self.variables.clone(),
            children_index: Arc::clone(&self.children_index),
        }
    }

    pub fn children_index(&self) -> &ChildrenIndex {
        &self.children_index
    }

    pub fn task_state(&self, task_id: &str) -> Option<&'a TaskState> {
        self.workflow_state.tasks.get(task_id)
    }
}

/// Composes the evaluation context templates are rendered against.
///
/// Building never fails: missing or malformed pieces degrade to empty values
/// and evaluation reports whatever was actually referenced.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    max_depth: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        ContextBuilder::new(10)
    }
}

impl ContextBuilder {
    pub fn new(max_depth: usize) -> Self {
        ContextBuilder { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn build(&self, ctx: &NormalizationContext<'_>) -> Map<String, Value> {
        let mut context = Map::new();
        context.insert("workflow".to_string(), self.workflow_context(ctx));
        context.insert("tasks".to_string(), Value::Object(self.tasks_context(ctx)));

        if let Some(parent) = &ctx.parent {
            context.insert("parent".to_string(), Value::Object(self.parent_context(ctx, parent)));
        }

        if let Some(input) = &ctx.current_input {
            context.insert("input".to_string(), Value::Object(input.clone()));
            for shortcut in ["item", "index"] {
                if let Some(value) = input.get(shortcut) {
                    context.insert(shortcut.to_string(), value.clone());
                }
            }
        }

        if let Some(env) = &ctx.merged_env {
            let env: Map<String, Value> = env
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            context.insert("env".to_string(), Value::Object(env));
        }

        for (key, value) in &ctx.variables {
            context.insert(key.clone(), value.clone());
        }
        context
    }

    /// Workflow config properties overlaid with runtime values; runtime wins.
    fn workflow_context(&self, ctx: &NormalizationContext<'_>) -> Value {
        let state = ctx.workflow_state;
        let mut workflow = ctx.workflow_config.as_map().unwrap_or_default();
        workflow.insert("id".to_string(), Value::String(state.workflow_id.clone()));
        workflow.insert(
            "exec_id".to_string(),
            Value::String(state.workflow_exec_id.clone()),
        );
        workflow.insert("status".to_string(), Value::String(state.status.to_string()));
        if let Some(input) = &state.input {
            workflow.insert("input".to_string(), Value::Object(input.clone()));
        }
        if let Some(output) = &state.output {
            workflow.insert("output".to_string(), Value::Object(output.clone()));
        }
        if let Some(error) = &state.error {
            workflow.insert("error".to_string(), error.to_value());
        }
        Value::Object(workflow)
    }

    fn tasks_context(&self, ctx: &NormalizationContext<'_>) -> Map<String, Value> {
        let mut tasks = Map::new();
        for (task_id, state) in &ctx.workflow_state.tasks {
            let mut entry = self.task_entry(ctx, state, 0);
            if let Some(config) = ctx.task_configs.get(task_id) {
                merge_config_properties(&mut entry, config);
            }
            tasks.insert(task_id.clone(), Value::Object(entry));
        }
        tasks
    }

    /// `{id, input, status, output, error?, children?}` for one task state.
    pub(crate) fn task_entry(
        &self,
        ctx: &NormalizationContext<'_>,
        state: &TaskState,
        depth: usize,
    ) -> Map<String, Value> {
        let mut entry = Map::new();
        entry.insert("id".to_string(), Value::String(state.task_id.clone()));
        entry.insert(
            "input".to_string(),
            state.input.clone().map(Value::Object).unwrap_or(Value::Null),
        );
        entry.insert("status".to_string(), Value::String(state.status.to_string()));
        if let Some(error) = &state.error {
            entry.insert("error".to_string(), error.to_value());
        }
        entry.insert("output".to_string(), self.task_output(ctx, state, depth));
        if state.can_have_children() {
            entry.insert(
                "children".to_string(),
                Value::Object(self.children_context(ctx, state, depth)),
            );
        }
        entry
    }

    /// Own output, plus one entry per runtime child for child-owning tasks.
    pub fn task_output(
        &self,
        ctx: &NormalizationContext<'_>,
        state: &TaskState,
        depth: usize,
    ) -> Value {
        if !state.can_have_children() {
            return state.output.clone().map(Value::Object).unwrap_or(Value::Null);
        }
        let mut output = state.output.clone().unwrap_or_default();
        if depth >= self.max_depth {
            return Value::Object(output);
        }
        for child in self.child_states(ctx, state) {
            let entry = self.child_entry(ctx, child, depth + 1, false);
            output.insert(child.task_id.clone(), Value::Object(entry));
        }
        Value::Object(output)
    }

    /// Children of a task keyed by child task id, bounded by the max depth.
    pub fn children_context(
        &self,
        ctx: &NormalizationContext<'_>,
        state: &TaskState,
        depth: usize,
    ) -> Map<String, Value> {
        let mut children = Map::new();
        if depth >= self.max_depth {
            return children;
        }
        for child in self.child_states(ctx, state) {
            let entry = self.child_entry(ctx, child, depth + 1, true);
            children.insert(child.task_id.clone(), Value::Object(entry));
        }
        children
    }

    fn child_entry(
        &self,
        ctx: &NormalizationContext<'_>,
        state: &TaskState,
        depth: usize,
        with_children: bool,
    ) -> Map<String, Value> {
        let mut entry = Map::new();
        entry.insert("id".to_string(), Value::String(state.task_id.clone()));
        entry.insert(
            "input".to_string(),
            state.input.clone().map(Value::Object).unwrap_or(Value::Null),
        );
        entry.insert("status".to_string(), Value::String(state.status.to_string()));
        if let Some(error) = &state.error {
            entry.insert("error".to_string(), error.to_value());
        }
        entry.insert("output".to_string(), self.task_output(ctx, state, depth));
        if with_children && state.can_have_children() {
            entry.insert(
                "children".to_string(),
                Value::Object(self.children_context(ctx, state, depth)),
            );
        }
        if let Some(config) = ctx.task_configs.get(&state.task_id) {
            merge_config_properties(&mut entry, config);
        }
        entry
    }

    fn child_states<'s>(
        &self,
        ctx: &NormalizationContext<'s>,
        state: &TaskState,
    ) -> Vec<&'s TaskState> {
        ctx.children_index()
            .children_of(&state.task_exec_id)
            .iter()
            .filter_map(|child_id| ctx.task_state(child_id))
            .collect()
    }

    fn parent_context(
        &self,
        ctx: &NormalizationContext<'_>,
        parent: &ParentSource<'_>,
    ) -> Map<String, Value> {
        match parent {
            ParentSource::Config(map) => map.clone(),
            ParentSource::Task(config) => {
                let mut map = config.as_map().unwrap_or_else(|_| {
                    let mut fallback = Map::new();
                    fallback.insert("id".to_string(), Value::String(config.id.clone()));
                    fallback
                });
                if let Some(state) = ctx.task_state(&config.id) {
                    overlay_runtime(&mut map, state);
                }
                map
            }
        }
    }
}

/// Runtime input, output, status and error of a task over its config map.
pub fn overlay_runtime(map: &mut Map<String, Value>, state: &TaskState) {
    map.insert(
        "input".to_string(),
        state.input.clone().map(Value::Object).unwrap_or(Value::Null),
    );
    map.insert(
        "output".to_string(),
        state.output.clone().map(Value::Object).unwrap_or(Value::Null),
    );
    map.insert("status".to_string(), Value::String(state.status.to_string()));
    if let Some(error) = &state.error {
        map.insert("error".to_string(), error.to_value());
    }
}

/// Config properties never override runtime values already in the entry.
fn merge_config_properties(entry: &mut Map<String, Value>, config: &TaskConfig) {
    let Ok(config_map) = config.as_map() else {
        return;
    };
    for (key, value) in config_map {
        if key == "input" || key == "output" || entry.contains_key(&key) {
            continue;
        }
        entry.insert(key, value);
    }
}
