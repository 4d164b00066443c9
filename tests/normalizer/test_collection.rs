use serde_json::{json, Map, Value};
use strata::core::entities::{TaskConfig, WorkflowConfig, WorkflowState};
use strata::core::error;
use strata::core::normalizer::{ConfigNormalizer, ProgressInfo};
use strata::core::template::{TemplateEngine, TemplateEvaluator};
use strata::core::types::{ErrorCategory, StatusType};

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn task(value: Value) -> TaskConfig {
    serde_json::from_value(value).unwrap()
}

fn expand(config: &TaskConfig) -> Vec<TaskConfig> {
    let workflow = WorkflowConfig::new("wf");
    let mut state = WorkflowState::new("wf", "wf-exec");
    state.input = Some(object(json!({"files": ["a", "b", "c"]})));
    ConfigNormalizer::default()
        .expand_collection(&state, &workflow, config)
        .unwrap()
}

fn ids(children: &[TaskConfig]) -> Vec<&str> {
    children.iter().map(|c| c.id.as_str()).collect()
}

#[test]
fn test_one_child_per_item() {
    let config = task(json!({
        "id": "proc",
        "type": "collection",
        "items": "{{ .workflow.input.files }}",
        "task": {"id": "handle", "action": "handle {{ .item }} at {{ .index }}"}
    }));

    let children = expand(&config);
    assert_eq!(ids(&children), vec!["proc_item_0", "proc_item_1", "proc_item_2"]);
    assert_eq!(children[1].action.as_deref(), Some("handle b at 1"));
    assert_eq!(
        children[2].with,
        Some(object(json!({"item": "c", "index": 2})))
    );
}

#[test]
fn test_filter_by_index_keeps_first_two() {
    let config = task(json!({
        "id": "proc",
        "type": "collection",
        "items": "{{ .workflow.input.files }}",
        "filter": "index < 2",
        "task": {"id": "handle", "with": {"val": "{{ .item }}"}}
    }));

    let children = expand(&config);
    assert_eq!(ids(&children), vec!["proc_item_0", "proc_item_1"]);
    assert_eq!(children[0].with.as_ref().unwrap()["val"], json!("a"));
    assert_eq!(children[1].with.as_ref().unwrap()["val"], json!("b"));
}

#[test]
fn test_filtered_children_are_reindexed() {
    let config = task(json!({
        "id": "proc",
        "type": "collection",
        "items": "{{ .workflow.input.files }}",
        "filter": "{{ .item != \"b\" }}",
        "task": {"id": "handle", "action": "{{ .item }}#{{ .index }}"}
    }));

    let children = expand(&config);
    assert_eq!(ids(&children), vec!["proc_item_0", "proc_item_1"]);
    assert_eq!(children[0].action.as_deref(), Some("a#0"));
    assert_eq!(children[1].action.as_deref(), Some("c#1"));
}

#[test]
fn test_filter_truthiness() {
    let config = task(json!({
        "id": "t",
        "type": "collection",
        "items": [0, 1, "", "x", "false", [], [1], {}, null],
        "filter": "item",
        "task": {"id": "c"}
    }));

    let children = expand(&config);
    let kept: Vec<Value> = children
        .iter()
        .map(|c| c.with.as_ref().unwrap()["item"].clone())
        .collect();
    assert_eq!(kept, vec![json!(1), json!("x"), json!([1])]);
}

#[test]
fn test_children_are_independent_copies() {
    let config = task(json!({
        "id": "t",
        "type": "collection",
        "items": ["a", "b"],
        "with": {"shared": {"nested": "v"}},
        "task": {
            "id": "c",
            "with": {"opts": {"depth": 1}},
            "env": {"MODE": "fast"},
            "agent": {"id": "w", "instructions": "go", "with": {"limits": {"k": 1}}}
        }
    }));

    let mut children = expand(&config);
    children[0]
        .with
        .as_mut()
        .unwrap()
        .insert("opts".to_string(), json!({"depth": 99}));
    children[0].with.as_mut().unwrap()["shared"]["nested"] = json!("changed");
    children[0]
        .env
        .as_mut()
        .unwrap()
        .insert("MODE".to_string(), "slow".to_string());
    children[0].agent.as_mut().unwrap().with.as_mut().unwrap()["limits"]["k"] = json!(7);

    let second = &children[1];
    let second_with = second.with.as_ref().unwrap();
    assert_eq!(second_with["opts"], json!({"depth": 1}));
    assert_eq!(second_with["shared"], json!({"nested": "v"}));
    assert_eq!(second.env.as_ref().unwrap()["MODE"], "fast");
    assert_eq!(
        second.agent.as_ref().unwrap().with,
        Some(object(json!({"limits": {"k": 1}})))
    );

    let template = config.task.as_ref().unwrap();
    assert_eq!(template.with, Some(object(json!({"opts": {"depth": 1}}))));
    assert_eq!(template.env.as_ref().unwrap()["MODE"], "fast");
    assert_eq!(
        template.agent.as_ref().unwrap().with,
        Some(object(json!({"limits": {"k": 1}})))
    );
    assert_eq!(config.with, Some(object(json!({"shared": {"nested": "v"}}))));
}

#[test]
fn test_multiple_templates_per_item() {
    let config = task(json!({
        "id": "batch",
        "type": "collection",
        "items": ["x", "y"],
        "tasks": [
            {"id": "fetch", "action": "fetch {{ .item }}"},
            {"id": "store", "action": "store {{ .item }}"}
        ]
    }));

    let children = expand(&config);
    assert_eq!(
        ids(&children),
        vec![
            "batch_item_0_task_0",
            "batch_item_0_task_1",
            "batch_item_1_task_0",
            "batch_item_1_task_1"
        ]
    );
    assert_eq!(children[3].action.as_deref(), Some("store y"));
}

#[test]
fn test_custom_item_and_index_variables() {
    let config = task(json!({
        "id": "t",
        "type": "collection",
        "items": ["a.txt"],
        "item_var": "file",
        "index_var": "pos",
        "with": {"dir": "/tmp"},
        "task": {"id": "c", "action": "{{ .input.dir }}/{{ .file }}@{{ .pos }}"}
    }));

    let children = expand(&config);
    assert_eq!(children[0].action.as_deref(), Some("/tmp/a.txt@0"));
    assert_eq!(
        children[0].with,
        Some(object(json!({"dir": "/tmp", "file": "a.txt", "pos": 0})))
    );
}

#[test]
fn test_map_items_become_key_value_pairs() {
    let config = task(json!({
        "id": "t",
        "type": "collection",
        "items": {"b": 2, "a": 1},
        "task": {"id": "c", "action": "{{ .item.key }}={{ .item.value }}"}
    }));

    let children = expand(&config);
    assert_eq!(children[0].action.as_deref(), Some("a=1"));
    assert_eq!(children[1].action.as_deref(), Some("b=2"));
}

#[test]
fn test_json_string_items() {
    let config = task(json!({
        "id": "t",
        "type": "collection",
        "items": "[\"one\", \"two\"]",
        "task": {"id": "c"}
    }));
    assert_eq!(expand(&config).len(), 2);
}

#[test]
fn test_incomplete_child_agent_inherits_parent_agent() {
    let config = task(json!({
        "id": "t",
        "type": "collection",
        "items": ["a", "b"],
        "agent": {
            "id": "main",
            "instructions": "review {{ .item }}",
            "actions": [{"id": "review", "prompt": "go"}]
        },
        "tasks": [
            {"id": "ref", "agent": {"id": "reviewer"}},
            {"id": "own", "agent": {"id": "custom", "instructions": "mine"}}
        ]
    }));

    let children = expand(&config);
    let inherited = children[0].agent.as_ref().unwrap();
    assert_eq!(inherited.id, "reviewer");
    assert_eq!(inherited.instructions, "review {{ .item }}");
    assert_eq!(inherited.actions.len(), 1);

    let own = children[1].agent.as_ref().unwrap();
    assert_eq!(own.id, "custom");
    assert_eq!(own.instructions, "mine");
}

#[test]
fn test_child_agent_and_tool_are_templated_per_item() {
    let config = task(json!({
        "id": "t",
        "type": "collection",
        "items": ["a"],
        "task": {
            "id": "c",
            "agent": {"id": "w", "instructions": "write {{ .item }}", "actions": [{"id": "x", "prompt": "p{{ .index }}"}]},
            "tool": {"id": "sh", "execute": "cat {{ .item }}", "env": {"N": "{{ .index }}"}}
        }
    }));

    let children = expand(&config);
    let agent = children[0].agent.as_ref().unwrap();
    assert_eq!(agent.instructions, "write a");
    assert_eq!(agent.actions[0].prompt, "p0");
    let tool = children[0].tool.as_ref().unwrap();
    assert_eq!(tool.execute, "cat a");
    assert_eq!(tool.env.as_ref().unwrap()["N"], "0");
}

#[test]
fn test_missing_items_is_an_input_error() {
    let workflow = WorkflowConfig::new("wf");
    let state = WorkflowState::new("wf", "wf-exec");
    let config = task(json!({"id": "t", "type": "collection", "task": {"id": "c"}}));

    let err = ConfigNormalizer::default()
        .expand_collection(&state, &workflow, &config)
        .unwrap_err();
    assert_eq!(err.code, error::MISSING_ITEMS);
    assert_eq!(err.category, ErrorCategory::InputError);
}

#[test]
fn test_filter_error_names_the_item() {
    let workflow = WorkflowConfig::new("wf");
    let state = WorkflowState::new("wf", "wf-exec");
    let config = task(json!({
        "id": "t",
        "type": "collection",
        "items": [{"a": 1}],
        "filter": "item.missing > 0",
        "task": {"id": "c"}
    }));

    let err = ConfigNormalizer::default()
        .expand_collection(&state, &workflow, &config)
        .unwrap_err();
    assert_eq!(err.code, error::FILTER_FAILED);
    assert!(err.message.contains("item 0"), "{}", err.message);
}

#[test]
fn test_child_template_error_names_the_item() {
    let workflow = WorkflowConfig::new("wf");
    let state = WorkflowState::new("wf", "wf-exec");
    let config = task(json!({
        "id": "t",
        "type": "collection",
        "items": [{"a": 1}, {"b": 2}],
        "task": {"id": "c", "action": "{{ .item.a }}"}
    }));

    let err = ConfigNormalizer::default()
        .expand_collection(&state, &workflow, &config)
        .unwrap_err();
    assert_eq!(err.code, error::CHILD_TEMPLATE_FAILED);
    assert!(
        err.message.contains("failed to create child config for item 1"),
        "{}",
        err.message
    );
}

#[test]
fn test_child_template_error_after_filter_names_both_positions() {
    let workflow = WorkflowConfig::new("wf");
    let state = WorkflowState::new("wf", "wf-exec");
    let config = task(json!({
        "id": "t",
        "type": "collection",
        "items": [
            {"a": 1, "keep": true},
            {"a": 2, "keep": false},
            {"b": 3, "keep": true}
        ],
        "filter": "item.keep",
        "task": {"id": "c", "action": "{{ .item.a }}"}
    }));

    let err = ConfigNormalizer::default()
        .expand_collection(&state, &workflow, &config)
        .unwrap_err();
    assert_eq!(err.code, error::CHILD_TEMPLATE_FAILED);
    assert!(
        err.message.contains("item 1 (source item 2)"),
        "{}",
        err.message
    );
}

#[test]
fn test_collection_without_template_is_rejected() {
    let workflow = WorkflowConfig::new("wf");
    let state = WorkflowState::new("wf", "wf-exec");
    let config = task(json!({"id": "t", "type": "collection", "items": [1]}));

    let err = ConfigNormalizer::default()
        .expand_collection(&state, &workflow, &config)
        .unwrap_err();
    assert_eq!(err.code, error::MISSING_FIELD);
    assert_eq!(err.category, ErrorCategory::InputError);
}

#[test]
fn test_progress_context() {
    let statuses = [
        StatusType::Success,
        StatusType::Failed,
        StatusType::Running,
        StatusType::Success,
    ];
    let progress = ProgressInfo::from_statuses(statuses.iter());
    assert_eq!(progress.total_children, 4);
    assert_eq!(progress.overall_status(), StatusType::Running);
    assert!(!progress.is_all_complete());

    let normalizer = ConfigNormalizer::default();
    let context = normalizer
        .expander()
        .create_progress_context(&Map::new(), &progress);
    let rendered = TemplateEngine::default()
        .render_string(
            "{{ .progress.completed_count }}/{{ .summary.total_children }} failures={{ .progress.has_failures }}",
            &context,
        )
        .unwrap();
    assert_eq!(rendered, "2/4 failures=true");
    assert_eq!(context["progress"]["status_counts"]["SUCCESS"], json!(2));
}
