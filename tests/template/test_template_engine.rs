use rhai::ImmutableString;
use serde_json::{json, Map, Value};
use strata::core::error;
use strata::core::template::{TemplateEngine, TemplateEvaluator};

fn context() -> Map<String, Value> {
    json!({
        "input": {"name": "ada", "count": 2, "tags": ["x", "y"], "flag": true, "empty": null},
        "tasks": {"fetch": {"output": {"items": [1, 2, 3]}}}
    })
    .as_object()
    .cloned()
    .unwrap()
}

#[test]
fn test_single_expression_preserves_type() {
    let engine = TemplateEngine::default();
    let ctx = context();
    let cases = [
        ("{{ .input.count }}", json!(2)),
        ("{{ .input.flag }}", json!(true)),
        ("{{ .input.tags }}", json!(["x", "y"])),
        ("{{ .tasks.fetch.output.items }}", json!([1, 2, 3])),
        ("  {{ .input.count * 10 }}  ", json!(20)),
    ];
    for (template, expected) in cases {
        let value = engine.parse_value(&json!(template), &ctx).unwrap();
        assert_eq!(value, expected, "template {}", template);
    }
}

#[test]
fn test_mixed_text_renders_strings() {
    let engine = TemplateEngine::default();
    let ctx = context();
    assert_eq!(
        engine
            .render_string("{{ .input.name }} has {{ .input.count }} tags: {{ .input.tags }}", &ctx)
            .unwrap(),
        "ada has 2 tags: [\"x\",\"y\"]"
    );
    assert_eq!(engine.render_string("[{{ .input.empty }}]", &ctx).unwrap(), "[]");
    assert_eq!(engine.render_string("no templates", &ctx).unwrap(), "no templates");
}

#[test]
fn test_nested_values_are_walked() {
    let engine = TemplateEngine::default();
    let value = json!({
        "list": ["{{ .input.name }}", 1, {"deep": "{{ .input.count + 1 }}"}],
        "plain": false
    });
    let parsed = engine.parse_value(&value, &context()).unwrap();
    assert_eq!(
        parsed,
        json!({"list": ["ada", 1, {"deep": 3}], "plain": false})
    );
}

#[test]
fn test_skip_predicate_applies_at_every_level() {
    let engine = TemplateEngine::default();
    let map = json!({
        "keep": "{{ .input.name }}",
        "outputs": "{{ .later }}",
        "nested": {"outputs": {"x": "{{ .later }}"}, "value": "{{ .input.count }}"}
    })
    .as_object()
    .cloned()
    .unwrap();

    let parsed = engine
        .parse_map_with_filter(&map, &context(), &|key| key == "outputs")
        .unwrap();
    assert_eq!(parsed["keep"], json!("ada"));
    assert_eq!(parsed["outputs"], json!("{{ .later }}"));
    assert_eq!(parsed["nested"]["outputs"]["x"], json!("{{ .later }}"));
    assert_eq!(parsed["nested"]["value"], json!(2));
}

#[test]
fn test_paths_through_reserved_words_and_hyphenated_ids() {
    let engine = TemplateEngine::default();
    let ctx = json!({
        "tasks": {
            "fetch": {"with": {"url": "u"}},
            "default": {"output": {"x": 1}},
            "fetch-data": {"output": {"x": 2}}
        },
        "parent": {"with": {"a": "b"}}
    })
    .as_object()
    .cloned()
    .unwrap();

    assert_eq!(engine.render_string("{{ .tasks.fetch.with.url }}", &ctx).unwrap(), "u");
    assert_eq!(engine.render_string("{{ .parent.with.a }}!", &ctx).unwrap(), "b!");
    assert_eq!(
        engine.parse_value(&json!("{{ .tasks.default.output.x }}"), &ctx).unwrap(),
        json!(1)
    );
    assert_eq!(
        engine.parse_value(&json!("{{ .tasks.fetch-data.output.x }}"), &ctx).unwrap(),
        json!(2)
    );
    let err = engine.render_string("{{ .tasks.fetch.with.uri }}", &ctx).unwrap_err();
    assert_eq!(err.code, error::EXPRESSION_FAILED);
    assert!(err.message.contains("uri"), "{}", err.message);
}

#[test]
fn test_errors_name_the_location() {
    let engine = TemplateEngine::default();
    let value = json!({"steps": ["ok", "{{ .input.nope }}"]});
    let err = engine.parse_value(&value, &context()).unwrap_err();
    assert_eq!(err.code, error::EXPRESSION_FAILED);
    assert!(err.message.contains("map key steps"), "{}", err.message);
    assert!(err.message.contains("index 1"), "{}", err.message);
    assert!(err.message.contains("nope"), "{}", err.message);
}

#[test]
fn test_malformed_templates_are_render_errors() {
    let engine = TemplateEngine::default();
    let ctx = context();
    let unterminated = engine.render_string("hello {{ .input.name", &ctx).unwrap_err();
    assert_eq!(unterminated.code, error::RENDER_FAILED);
    let empty = engine.render_string("hello {{ }}", &ctx).unwrap_err();
    assert_eq!(empty.code, error::RENDER_FAILED);
}

#[test]
fn test_bare_expressions_and_pipes() {
    let engine = TemplateEngine::default();
    let ctx = context();
    assert_eq!(
        engine.evaluate_expression("input.count >= 2 && input.flag", &ctx).unwrap(),
        json!(true)
    );
    assert_eq!(
        engine.evaluate_expression(".input.name | upper", &ctx).unwrap(),
        json!("ADA")
    );
    assert_eq!(
        engine
            .evaluate_expression(".input.empty | coalesce(\"none\") | upper", &ctx)
            .unwrap(),
        json!("NONE")
    );
    assert_eq!(
        engine.evaluate_expression(".input.flag || false", &ctx).unwrap(),
        json!(true)
    );
}

#[test]
fn test_host_functions_can_be_registered() {
    let mut engine = TemplateEngine::default();
    engine
        .expressions_mut()
        .engine_mut()
        .register_fn("shout", |s: ImmutableString| format!("{}!", s));
    assert_eq!(
        engine.render_string("{{ .input.name | shout }}", &context()).unwrap(),
        "ada!"
    );
}

#[test]
fn test_operation_budget() {
    let engine = TemplateEngine::with_max_operations(5);
    let ctx = context();
    let long = format!(
        "{{{{ {} }}}}",
        vec![".input.count"; 12].join(" + ")
    );
    let long = long.as_str();
    assert!(engine.render_string(long, &ctx).is_err());
    assert!(TemplateEngine::default().render_string(long, &ctx).is_ok());
}

#[test]
fn test_has_template() {
    let engine = TemplateEngine::default();
    assert!(engine.has_template("a {{ b }}"));
    assert!(!engine.has_template("a { b }"));
}
