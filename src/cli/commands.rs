use crate::cli::args::{ExpandArgs, OutputArgs, RenderArgs, TaskArgs};
use crate::core::config::{loader::CONFIG_FILE_NAME, ConfigLoader, EngineConfig};
use crate::core::entities::{TaskConfig, WorkflowConfig, WorkflowState};
use crate::core::normalizer::{build_task_configs_map, ConfigNormalizer};
use crate::core::template::{TemplateEngine, TemplateEvaluator};
use crate::Result;
use crate::utils::FileUtils;
use anyhow::anyhow;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    let config = ConfigLoader::load(&path)?;
    debug!(path = %path.display(), engine = ?config.engine, "loaded engine config");
    Ok(config.engine)
}

pub fn task(args: TaskArgs, engine: &EngineConfig) -> Result<()> {
    let (workflow, state) = load_workflow(&args.workflow, args.state.as_deref())?;
    let mut task = find_task(&workflow.tasks, &args.task)
        .cloned()
        .ok_or_else(|| anyhow!("task {} not found in workflow {}", args.task, workflow.id))?;

    let normalizer = ConfigNormalizer::new(engine);
    let env = normalizer.normalize_task(&state, &workflow, &mut task)?;
    info!(task_id = %task.id, "task normalized");

    if args.components {
        let task_configs = build_task_configs_map(&workflow.tasks);
        if let Some(mut agent) = task.agent.take() {
            normalizer.normalize_agent_component(&state, &workflow, &task, &mut agent, &task_configs)?;
            task.agent = Some(agent);
        }
        if let Some(mut tool) = task.tool.take() {
            normalizer.normalize_tool_component(&state, &workflow, &task, &mut tool, &task_configs)?;
            task.tool = Some(tool);
        }
        if let Some(transition) = task.on_success.as_mut() {
            normalizer.normalize_success_transition(
                transition,
                &state,
                &workflow,
                &task_configs,
                Some(&env),
            )?;
        }
        if let Some(transition) = task.on_error.as_mut() {
            normalizer.normalize_error_transition(
                transition,
                &state,
                &workflow,
                &task_configs,
                Some(&env),
            )?;
        }
    }

    print_json(&json!({ "config": task, "env": env }))
}

pub fn expand(args: ExpandArgs, engine: &EngineConfig) -> Result<()> {
    let (workflow, state) = load_workflow(&args.workflow, args.state.as_deref())?;
    let task = find_task(&workflow.tasks, &args.task)
        .ok_or_else(|| anyhow!("task {} not found in workflow {}", args.task, workflow.id))?;

    let children = ConfigNormalizer::new(engine).expand_collection(&state, &workflow, task)?;
    info!(task_id = %task.id, children = children.len(), "collection expanded");
    print_json(&children)
}

pub fn output(args: OutputArgs, engine: &EngineConfig) -> Result<()> {
    let (workflow, state) = load_workflow(&args.workflow, Some(&args.state))?;
    let normalizer = ConfigNormalizer::new(engine);

    let Some(task_id) = args.task else {
        let output =
            normalizer.normalize_workflow_output(&state, &workflow, workflow.outputs.as_ref())?;
        return print_json(&output.map(Value::Object).unwrap_or(Value::Null));
    };

    let task = find_task(&workflow.tasks, &task_id)
        .ok_or_else(|| anyhow!("task {} not found in workflow {}", task_id, workflow.id))?;
    let runtime_output = state
        .tasks
        .get(&task_id)
        .and_then(|s| s.output.clone())
        .unwrap_or_default();
    let output = normalizer.normalize_task_output(
        &runtime_output,
        task.outputs.as_ref(),
        &state,
        &workflow,
        task,
    )?;
    print_json(&output)
}

pub fn render(args: RenderArgs, engine: &EngineConfig) -> Result<()> {
    let context: Map<String, Value> = match &args.context {
        Some(path) => FileUtils::load(path)?,
        None => Map::new(),
    };
    let evaluator = TemplateEngine::with_max_operations(engine.max_operations);
    match evaluator.parse_value(&Value::String(args.template), &context)? {
        Value::String(text) => println!("{}", text),
        other => print_json(&other)?,
    }
    Ok(())
}

fn load_workflow(workflow_path: &Path, state_path: Option<&Path>) -> Result<(WorkflowConfig, WorkflowState)> {
    let workflow: WorkflowConfig = FileUtils::load(workflow_path)?;
    let state = match state_path {
        Some(path) => FileUtils::load(path)?,
        None => WorkflowState::new(workflow.id.clone(), ""),
    };
    Ok((workflow, state))
}

/// Depth-first search through sub-tasks and task templates.
fn find_task<'a>(tasks: &'a [TaskConfig], task_id: &str) -> Option<&'a TaskConfig> {
    for task in tasks {
        if task.id == task_id {
            return Some(task);
        }
        if let Some(found) = find_task(&task.tasks, task_id) {
            return Some(found);
        }
        if let Some(template) = task.task.as_deref() {
            if let Some(found) = find_task(std::slice::from_ref(template), task_id) {
                return Some(found);
            }
        }
    }
    None
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
