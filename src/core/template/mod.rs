#![allow(clippy::result_large_err)]

use crate::core::error::{self, AppError};
use crate::core::expression::{ExpressionEngine, ExpressionError};
use crate::core::types::ErrorCategory;
use rhai::Scope;
use serde_json::{Map, Value};
use thiserror::Error;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Key predicate for [`TemplateEvaluator::parse_map_with_filter`]; `true` means
/// the value under that key is copied literally.
pub type SkipKey<'f> = &'f dyn Fn(&str) -> bool;

/// Evaluates templated values against a context map.
pub trait TemplateEvaluator: Send + Sync {
    /// Render a template to text.
    fn render_string(&self, template: &str, ctx: &Map<String, Value>) -> Result<String, AppError>;

    /// Evaluate every string leaf of an arbitrary value.
    fn parse_value(&self, value: &Value, ctx: &Map<String, Value>) -> Result<Value, AppError>;

    /// Evaluate a map, copying values under skipped keys verbatim at every level.
    fn parse_map_with_filter(
        &self,
        map: &Map<String, Value>,
        ctx: &Map<String, Value>,
        skip: SkipKey<'_>,
    ) -> Result<Map<String, Value>, AppError>;

    /// Evaluate a bare expression, written without delimiters.
    fn evaluate_expression(&self, expr: &str, ctx: &Map<String, Value>) -> Result<Value, AppError>;

    fn has_template(&self, s: &str) -> bool {
        s.contains(OPEN)
    }
}

#[derive(Debug, Error)]
enum TemplateError {
    #[error("unterminated template expression in '{0}'")]
    Unterminated(String),
    #[error("empty template expression in '{0}'")]
    Empty(String),
    #[error("failed to evaluate '{expr}': {source}")]
    Expression {
        expr: String,
        #[source]
        source: ExpressionError,
    },
}

impl From<TemplateError> for AppError {
    fn from(err: TemplateError) -> Self {
        let code = match err {
            TemplateError::Expression { .. } => error::EXPRESSION_FAILED,
            _ => error::RENDER_FAILED,
        };
        AppError::new(ErrorCategory::ResolutionError, err.to_string()).with_code(code)
    }
}

enum Segment<'t> {
    Text(&'t str),
    Expr(&'t str),
}

fn segments(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut out = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find(OPEN) {
        if start > 0 {
            out.push(Segment::Text(&rest[..start]));
        }
        let after = &rest[start + OPEN.len()..];
        let end = after
            .find(CLOSE)
            .ok_or_else(|| TemplateError::Unterminated(template.to_string()))?;
        let expr = after[..end].trim();
        if expr.is_empty() {
            return Err(TemplateError::Empty(template.to_string()));
        }
        out.push(Segment::Expr(expr));
        rest = &after[end + CLOSE.len()..];
    }
    if !rest.is_empty() {
        out.push(Segment::Text(rest));
    }
    Ok(out)
}

/// Text form of an evaluated value inside mixed text.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Default evaluator backed by the Rhai [`ExpressionEngine`].
#[derive(Default)]
pub struct TemplateEngine {
    expressions: ExpressionEngine,
}

impl TemplateEngine {
    pub fn new(expressions: ExpressionEngine) -> Self {
        Self { expressions }
    }

    pub fn with_max_operations(max_operations: u64) -> Self {
        Self::new(ExpressionEngine::new(max_operations))
    }

    pub fn expressions_mut(&mut self) -> &mut ExpressionEngine {
        &mut self.expressions
    }

    fn eval(&self, expr: &str, scope: &mut Scope<'static>) -> Result<Value, TemplateError> {
        self.expressions
            .evaluate_in(expr, scope)
            .map_err(|source| TemplateError::Expression {
                expr: expr.to_string(),
                source,
            })
    }

    /// A string that is exactly one expression keeps the expression's type.
    fn eval_string(&self, template: &str, scope: &mut Scope<'static>) -> Result<Value, TemplateError> {
        let parts = segments(template.trim())?;
        if let [Segment::Expr(expr)] = parts.as_slice() {
            return self.eval(expr, scope);
        }
        let mut rendered = String::with_capacity(template.len());
        for part in segments(template)? {
            match part {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Expr(expr) => rendered.push_str(&value_to_text(&self.eval(expr, scope)?)),
            }
        }
        Ok(Value::String(rendered))
    }

    fn walk(
        &self,
        value: &Value,
        scope: &mut Scope<'static>,
        skip: Option<SkipKey<'_>>,
    ) -> Result<Value, AppError> {
        match value {
            Value::String(s) if self.has_template(s) => Ok(self.eval_string(s, scope)?),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    self.walk(item, scope, skip)
                        .map_err(|e| e.wrap(format!("failed to parse template at index {}", i)))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => Ok(Value::Object(self.walk_map(map, scope, skip)?)),
            other => Ok(other.clone()),
        }
    }

    fn walk_map(
        &self,
        map: &Map<String, Value>,
        scope: &mut Scope<'static>,
        skip: Option<SkipKey<'_>>,
    ) -> Result<Map<String, Value>, AppError> {
        let mut out = Map::with_capacity(map.len());
        for (key, value) in map {
            if skip.map(|f| f(key)).unwrap_or(false) {
                out.insert(key.clone(), value.clone());
                continue;
            }
            let parsed = self
                .walk(value, scope, skip)
                .map_err(|e| e.wrap(format!("failed to parse template in map key {}", key)))?;
            out.insert(key.clone(), parsed);
        }
        Ok(out)
    }
}

impl TemplateEvaluator for TemplateEngine {
    fn render_string(&self, template: &str, ctx: &Map<String, Value>) -> Result<String, AppError> {
        if !self.has_template(template) {
            return Ok(template.to_string());
        }
        let mut scope = self.expressions.scope_for(ctx);
        Ok(value_to_text(&self.eval_string(template, &mut scope)?))
    }

    fn parse_value(&self, value: &Value, ctx: &Map<String, Value>) -> Result<Value, AppError> {
        let mut scope = self.expressions.scope_for(ctx);
        self.walk(value, &mut scope, None)
    }

    fn parse_map_with_filter(
        &self,
        map: &Map<String, Value>,
        ctx: &Map<String, Value>,
        skip: SkipKey<'_>,
    ) -> Result<Map<String, Value>, AppError> {
        let mut scope = self.expressions.scope_for(ctx);
        self.walk_map(map, &mut scope, Some(skip))
    }

    fn evaluate_expression(&self, expr: &str, ctx: &Map<String, Value>) -> Result<Value, AppError> {
        let mut scope = self.expressions.scope_for(ctx);
        Ok(self.eval(expr.trim(), &mut scope)?)
    }
}
