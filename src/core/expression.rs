use regex::Regex;
use rhai::{Array, Dynamic, Engine, ImmutableString, Map, Scope};
use serde_json::{Map as JsonMap, Number, Value};
use std::sync::OnceLock;
use thiserror::Error;

/// Default operation budget for a single expression.
pub const DEFAULT_MAX_OPERATIONS: u64 = 50_000;

/// Characters after which a `.` starts a root path rather than a property access.
const ROOT_DOT_PRECEDERS: &str = "([{,=<>!&|+-*/%:?";

/// A pipe stage: a function name with optional call arguments.
const PIPE_STAGE_PATTERN: &str = r"(?s)^([A-Za-z_][A-Za-z0-9_]*)\s*(?:\((.*)\))?$";

#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("{0}")]
    Eval(String),
    #[error("malformed pipe in expression '{0}'")]
    Pipe(String),
}

/// Expression evaluation engine using a locked-down Rhai configuration.
///
/// Unknown variables and unknown map properties are errors, so a misspelled
/// path surfaces instead of evaluating to an empty value.
pub struct ExpressionEngine {
    engine: Engine,
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OPERATIONS)
    }
}

impl ExpressionEngine {
    pub fn new(max_operations: u64) -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(max_operations);
        engine.set_max_call_levels(64);
        engine.set_max_expr_depths(64, 64);
        engine.set_fail_on_invalid_map_property(true);
        engine.on_print(|_| {});
        engine.on_debug(|_, _, _| {});
        register_builtins(&mut engine);
        ExpressionEngine { engine }
    }

    /// Access the underlying engine to register host functions.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Build a scope exposing each top-level context key as a variable.
    pub fn scope_for(&self, ctx: &JsonMap<String, Value>) -> Scope<'static> {
        let mut scope = Scope::new();
        for (key, value) in ctx {
            scope.push_dynamic(key.clone(), to_dynamic(value));
        }
        scope
    }

    /// Evaluate a single expression against the provided context.
    pub fn evaluate(&self, expr: &str, ctx: &JsonMap<String, Value>) -> Result<Value, ExpressionError> {
        let mut scope = self.scope_for(ctx);
        self.evaluate_in(expr, &mut scope)
    }

    /// Evaluate an expression against a scope built with [`ExpressionEngine::scope_for`].
    pub fn evaluate_in(&self, expr: &str, scope: &mut Scope<'static>) -> Result<Value, ExpressionError> {
        let script = rewrite_pipes(&rewrite_paths(expr))?;
        let result = self
            .engine
            .eval_expression_with_scope::<Dynamic>(scope, &script)
            .map_err(|err| ExpressionError::Eval(err.to_string()))?;
        Ok(from_dynamic(result))
    }
}

fn register_builtins(engine: &mut Engine) {
    engine.register_fn("upper", |s: ImmutableString| s.to_uppercase());
    engine.register_fn("lower", |s: ImmutableString| s.to_lowercase());
    engine.register_fn("trim", |s: ImmutableString| s.trim().to_string());
    engine.register_fn("to_json", |value: Dynamic| {
        serde_json::to_string(&from_dynamic(value)).unwrap_or_default()
    });
    engine.register_fn("coalesce", |value: Dynamic, fallback: Dynamic| {
        if value.is_unit() {
            fallback
        } else {
            value
        }
    });
}

/// Rewrite dotted paths into index access: `.tasks.fetch-data.with` becomes
/// `tasks["fetch-data"]["with"]`.
///
/// Segments after the root may contain hyphens and reserved words. A segment
/// followed by `(` stays a method call, and an all-digit segment indexes an array.
pub(crate) fn rewrite_paths(expr: &str) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let mut out = String::with_capacity(expr.len() + 8);
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            out.push(c);
            if c == q && chars[i - 1] != '\\' {
                quote = None;
            }
            i += 1;
            continue;
        }
        let prev = if i == 0 { None } else { Some(chars[i - 1]) };
        match c {
            '"' | '\'' | '`' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            '.' if starts_root_path(prev) && chars.get(i + 1).copied().is_some_and(is_ident_start) => {
                i = push_path(&chars, i + 1, &mut out);
            }
            _ if is_ident_start(c) && !prev.is_some_and(|p| is_ident_char(p) || p == '.') => {
                i = push_path(&chars, i, &mut out);
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn starts_root_path(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(p) => p.is_whitespace() || ROOT_DOT_PRECEDERS.contains(p),
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Emit the path starting at `start` and return the index just past it.
fn push_path(chars: &[char], start: usize, out: &mut String) -> usize {
    let mut i = start;
    while i < chars.len() && is_ident_char(chars[i]) {
        out.push(chars[i]);
        i += 1;
    }

    while chars.get(i) == Some(&'.') && chars.get(i + 1).copied().is_some_and(is_ident_char) {
        let seg_start = i + 1;
        let mut end = seg_start;
        while end < chars.len() {
            let ch = chars[end];
            let inner_hyphen =
                ch == '-' && end > seg_start && chars.get(end + 1).copied().is_some_and(is_ident_char);
            if is_ident_char(ch) || inner_hyphen {
                end += 1;
            } else {
                break;
            }
        }
        let segment: String = chars[seg_start..end].iter().collect();
        if chars.get(end) == Some(&'(') {
            out.push('.');
            out.push_str(&segment);
        } else if segment.chars().all(|ch| ch.is_ascii_digit()) {
            out.push_str(&format!("[{}]", segment));
        } else {
            out.push_str(&format!("[\"{}\"]", segment));
        }
        i = end;
    }
    i
}

/// Rewrite `x | f` into `f(x)` and `x | f(a)` into `f(x, a)`.
pub(crate) fn rewrite_pipes(expr: &str) -> Result<String, ExpressionError> {
    let segments = split_pipes(expr);
    let mut segments = segments.into_iter();
    let mut acc = match segments.next() {
        Some(first) => first.trim().to_string(),
        None => return Ok(String::new()),
    };

    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() || acc.is_empty() {
            return Err(ExpressionError::Pipe(expr.to_string()));
        }
        let caps = pipe_stage()?
            .captures(segment)
            .ok_or_else(|| ExpressionError::Pipe(expr.to_string()))?;
        let name = &caps[1];
        acc = match caps.get(2).map(|args| args.as_str().trim()) {
            Some(args) if !args.is_empty() => format!("{}({}, {})", name, acc, args),
            _ => format!("{}({})", name, acc),
        };
    }
    Ok(acc)
}

fn pipe_stage() -> Result<&'static Regex, ExpressionError> {
    static STAGE: OnceLock<Option<Regex>> = OnceLock::new();
    STAGE
        .get_or_init(|| Regex::new(PIPE_STAGE_PATTERN).ok())
        .as_ref()
        .ok_or_else(|| ExpressionError::Pipe(PIPE_STAGE_PATTERN.to_string()))
}

fn split_pipes(expr: &str) -> Vec<String> {
    let chars: Vec<char> = expr.chars().collect();
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0i32;

    for (i, &c) in chars.iter().enumerate() {
        if let Some(q) = quote {
            current.push(c);
            if c == q && (i == 0 || chars[i - 1] != '\\') {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(c);
            }
            '|' if depth == 0 => {
                let prev_pipe = i > 0 && chars[i - 1] == '|';
                let next_pipe = chars.get(i + 1) == Some(&'|');
                if prev_pipe || next_pipe {
                    current.push(c);
                } else {
                    segments.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    segments.push(current);
    segments
}

pub(crate) fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::from(0_i64)
            }
        }
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => {
            let arr: Array = items.iter().map(to_dynamic).collect();
            Dynamic::from_array(arr)
        }
        Value::Object(map) => {
            let mut rhai_map = Map::new();
            for (key, value) in map {
                rhai_map.insert(key.into(), to_dynamic(value));
            }
            Dynamic::from_map(rhai_map)
        }
    }
}

pub(crate) fn from_dynamic(value: Dynamic) -> Value {
    if value.is_unit() {
        return Value::Null;
    }
    if let Some(b) = value.clone().try_cast::<bool>() {
        return Value::Bool(b);
    }
    if let Some(i) = value.clone().try_cast::<i64>() {
        return Value::Number(Number::from(i));
    }
    if let Some(f) = value.clone().try_cast::<f64>() {
        if let Some(num) = Number::from_f64(f) {
            return Value::Number(num);
        }
    }
    if let Some(c) = value.clone().try_cast::<char>() {
        return Value::String(c.to_string());
    }
    if let Some(s) = value.clone().try_cast::<String>() {
        return Value::String(s);
    }
    if let Some(arr) = value.clone().try_cast::<Array>() {
        return Value::Array(arr.into_iter().map(from_dynamic).collect());
    }
    if let Some(map) = value.clone().try_cast::<Map>() {
        let mut json_map = JsonMap::new();
        for (key, value) in map {
            json_map.insert(key.into(), from_dynamic(value));
        }
        return Value::Object(json_map);
    }
    Value::String(value.to_string())
}
