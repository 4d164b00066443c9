//! Truthiness and sequence coercion shared by every filter and collection call site.

use serde_json::{Map, Value};

/// Truthiness of an evaluated filter result.
///
/// Zero is false; the strings `""` and `"false"` are false; empty sequences
/// and maps are false; null is false. Everything else is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !(s.is_empty() || s == "false"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Coerce a resolved items value into an ordered sequence.
///
/// Maps become `{key, value}` pairs in sorted key order.
pub fn to_sequence(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
                .into_iter()
                .map(|(key, value)| {
                    let mut pair = Map::new();
                    pair.insert("key".to_string(), Value::String(key));
                    pair.insert("value".to_string(), value);
                    Value::Object(pair)
                })
                .collect()
        }
        scalar => vec![scalar],
    }
}
