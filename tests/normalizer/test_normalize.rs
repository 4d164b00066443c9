use serde_json::{json, Map, Value};
use strata::core::entities::{AgentConfig, TaskConfig, TaskState, WorkflowConfig, WorkflowState};
use strata::core::error;
use strata::core::normalizer::{
    build_task_configs_map, ConfigNormalizer, NormalizationContext, Normalizer, ParentSource,
};
use strata::core::types::{ErrorCategory, ExecutionType, StatusType};

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn state_with_processor() -> WorkflowState {
    let mut state = WorkflowState::new("wf", "wf-exec");
    state.input = Some(object(json!({"user": "ada"})));
    let mut processor = TaskState::new("processor", "p-exec");
    processor.status = StatusType::Success;
    processor.output = Some(object(json!({"data": {"rows": 3}})));
    state.add_task(processor);
    state
}

#[test]
fn test_resolves_sibling_output_and_workflow_input() {
    let workflow = WorkflowConfig::new("wf");
    let state = state_with_processor();
    let mut task: TaskConfig = serde_json::from_value(json!({
        "id": "report",
        "action": "rows={{ .tasks.processor.output.data.rows }}",
        "with": {"static": 1, "owner": "{{ .workflow.input.user }}", "rows": "{{ .tasks.processor.output.data.rows }}"}
    }))
    .unwrap();

    ConfigNormalizer::default()
        .normalize_task(&state, &workflow, &mut task)
        .unwrap();

    assert_eq!(task.action.as_deref(), Some("rows=3"));
    assert_eq!(
        task.with,
        Some(object(json!({"static": 1, "owner": "ada", "rows": 3})))
    );
}

#[test]
fn test_misspelled_property_fails_fast() {
    let workflow = WorkflowConfig::new("wf");
    let state = state_with_processor();
    let mut task: TaskConfig = serde_json::from_value(json!({
        "id": "report",
        "action": "{{ .tasks.processor.outpu.data }}"
    }))
    .unwrap();

    let err = ConfigNormalizer::default()
        .normalize_task(&state, &workflow, &mut task)
        .unwrap_err();
    assert_eq!(err.code, error::EXPRESSION_FAILED);
    assert_eq!(err.category, ErrorCategory::ResolutionError);
    assert!(err.message.contains("outpu"), "{}", err.message);
    assert!(err.message.contains("action"), "{}", err.message);
    assert!(err.message.contains("report"), "{}", err.message);
}

#[test]
fn test_unknown_root_variable_fails_fast() {
    let workflow = WorkflowConfig::new("wf");
    let state = state_with_processor();
    let mut task: TaskConfig = serde_json::from_value(json!({
        "id": "report",
        "with": {"value": "{{ .nonexistent }}"}
    }))
    .unwrap();

    let err = ConfigNormalizer::default()
        .normalize_task(&state, &workflow, &mut task)
        .unwrap_err();
    assert!(err.message.contains("nonexistent"), "{}", err.message);
    assert!(err.message.contains("with"), "{}", err.message);
}

#[test]
fn test_parallel_sub_tasks_see_parallel_task_as_parent() {
    let workflow: WorkflowConfig = serde_json::from_value(json!({
        "id": "wf",
        "tasks": [{
            "id": "fanout",
            "type": "parallel",
            "with": {"batch": 5},
            "tasks": [
                {"id": "left", "action": "{{ .parent.id }}:{{ .parent.input.batch }}:{{ .parent.status }}"},
                {"id": "right", "action": "side {{ .input.side }}", "with": {"side": "r"}}
            ]
        }]
    }))
    .unwrap();
    let mut state = WorkflowState::new("wf", "wf-exec");
    let mut fanout = TaskState::new("fanout", "f-exec");
    fanout.execution_type = ExecutionType::Parallel;
    fanout.status = StatusType::Running;
    fanout.input = Some(object(json!({"batch": 5})));
    state.add_task(fanout);

    let mut task = workflow.tasks[0].clone();
    ConfigNormalizer::default()
        .normalize_task(&state, &workflow, &mut task)
        .unwrap();

    assert_eq!(task.tasks[0].action.as_deref(), Some("fanout:5:RUNNING"));
    assert_eq!(task.tasks[1].action.as_deref(), Some("side r"));
}

#[test]
fn test_composite_sub_tasks_stay_literal() {
    let workflow = WorkflowConfig::new("wf");
    let state = WorkflowState::new("wf", "wf-exec");
    let mut task: TaskConfig = serde_json::from_value(json!({
        "id": "steps",
        "type": "composite",
        "tasks": [{"id": "later", "action": "{{ .tasks.earlier.output.value }}"}]
    }))
    .unwrap();

    ConfigNormalizer::default()
        .normalize_task(&state, &workflow, &mut task)
        .unwrap();
    assert_eq!(
        task.tasks[0].action.as_deref(),
        Some("{{ .tasks.earlier.output.value }}")
    );
}

#[test]
fn test_literal_keys_are_not_templated() {
    let workflow = WorkflowConfig::new("wf");
    let state = WorkflowState::new("wf", "wf-exec");
    let mut task: TaskConfig = serde_json::from_value(json!({
        "id": "each",
        "type": "collection",
        "items": "{{ .input.files }}",
        "filter": "{{ .item != \"skip\" }}",
        "outputs": {"count": "{{ .output.total }}"},
        "on_success": {"next": "{{ .tasks.missing.id }}"},
        "with": {"files": ["a"]}
    }))
    .unwrap();
    let before = task.clone();

    ConfigNormalizer::default()
        .normalize_task(&state, &workflow, &mut task)
        .unwrap();

    assert_eq!(task.items, before.items);
    assert_eq!(task.filter, before.filter);
    assert_eq!(task.outputs, before.outputs);
    assert_eq!(task.on_success, before.on_success);
}

#[test]
fn test_agent_action_sees_agent_as_parent() {
    let workflow = WorkflowConfig::new("wf");
    let state = WorkflowState::new("wf", "wf-exec");
    let configs = build_task_configs_map(&workflow.tasks);
    let mut ctx = NormalizationContext::new(&state, &workflow, &configs);
    let mut agent: AgentConfig = serde_json::from_value(json!({
        "id": "writer",
        "instructions": "Write about {{ .input.topic }}",
        "model": {"provider": "openai", "model": "gpt", "config": {"temperature": 0.5}},
        "with": {"topic": "rust"},
        "actions": [
            {"id": "draft", "prompt": "{{ .parent.id }} {{ .parent.config.temperature }} {{ .input.topic }} {{ .input.length }}", "with": {"length": 200}},
            {"id": "unused", "prompt": "{{ .nothing }}"}
        ],
        "tools": [{"id": "search", "description": "search for {{ .parent.id }}"}]
    }))
    .unwrap();

    Normalizer::default()
        .normalize_agent(&mut agent, &mut ctx, Some("draft"))
        .unwrap();

    assert_eq!(agent.instructions, "Write about rust");
    let draft = agent.find_action("draft").unwrap();
    assert_eq!(draft.prompt, "writer 0.5 rust 200");
    assert_eq!(
        draft.with,
        Some(object(json!({"topic": "rust", "length": 200})))
    );
    assert_eq!(agent.find_action("unused").unwrap().prompt, "{{ .nothing }}");
    assert_eq!(agent.tools[0].description, "search for writer");
}

#[test]
fn test_unknown_action_is_reported() {
    let workflow = WorkflowConfig::new("wf");
    let state = WorkflowState::new("wf", "wf-exec");
    let configs = build_task_configs_map(&workflow.tasks);
    let mut ctx = NormalizationContext::new(&state, &workflow, &configs);
    let mut agent: AgentConfig = serde_json::from_value(json!({
        "id": "writer",
        "actions": [{"id": "draft"}]
    }))
    .unwrap();

    let err = Normalizer::default()
        .normalize_agent(&mut agent, &mut ctx, Some("publish"))
        .unwrap_err();
    assert_eq!(err.code, error::UNKNOWN_ACTION);
    assert_eq!(err.category, ErrorCategory::InputError);
}

#[test]
fn test_signal_is_exposed_to_templates() {
    let workflow = WorkflowConfig::new("wf");
    let state = WorkflowState::new("wf", "wf-exec");
    let configs = build_task_configs_map(&workflow.tasks);
    let mut ctx = NormalizationContext::new(&state, &workflow, &configs)
        .with_parent(ParentSource::Config(object(json!({"id": "wf"}))));
    let mut task: TaskConfig = serde_json::from_value(json!({
        "id": "approve",
        "type": "signal",
        "action": "{{ .signal.id }} by {{ .signal.payload.by }} in {{ .parent.id }}"
    }))
    .unwrap();

    Normalizer::default()
        .normalize_task_with_signal(&mut task, &mut ctx, "approval", json!({"by": "ops"}))
        .unwrap();
    assert_eq!(task.action.as_deref(), Some("approval by ops in wf"));
}

#[test]
fn test_workflow_is_the_parent_of_top_level_tasks() {
    let workflow = WorkflowConfig::new("wf");
    let mut state = WorkflowState::new("wf", "wf-exec");
    state.input = Some(object(json!({"region": "eu"})));
    let mut task: TaskConfig = serde_json::from_value(json!({
        "id": "deploy",
        "action": "{{ .parent.id }}/{{ .parent.input.region }}"
    }))
    .unwrap();

    ConfigNormalizer::default()
        .normalize_task(&state, &workflow, &mut task)
        .unwrap();
    assert_eq!(task.action.as_deref(), Some("wf/eu"));
}

#[test]
fn test_extra_fields_are_templated_and_kept() {
    let workflow = WorkflowConfig::new("wf");
    let state = state_with_processor();
    let mut task: TaskConfig = serde_json::from_value(json!({
        "id": "t",
        "timeout": "{{ .tasks.processor.output.data.rows * 10 }}s",
        "retries": 2
    }))
    .unwrap();

    ConfigNormalizer::default()
        .normalize_task(&state, &workflow, &mut task)
        .unwrap();
    assert_eq!(task.extra.get("timeout"), Some(&json!("30s")));
    assert_eq!(task.extra.get("retries"), Some(&json!(2)));
}
