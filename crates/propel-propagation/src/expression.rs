//! Expression evaluation.
//!
//! Derived attributes, account links, mandatory conditions and free mapping
//! expressions are all strings evaluated against a map of variables built
//! from the subject. The language is pluggable behind [`ExpressionEvaluator`].
//!
//! Two evaluators ship with the crate:
//!
//! - [`TemplateEvaluator`] substitutes `${name}` placeholders.
//! - [`RhaiEvaluator`] runs the expression as a sandboxed Rhai script.

use std::sync::LazyLock;

use regex::Regex;
use rhai::{Engine, Scope};
use thiserror::Error;
use tracing::{debug, info, warn};

/// `${name}` placeholder of [`TemplateEvaluator`].
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([\w.]+)\}").expect("PLACEHOLDER_RE is a valid regex pattern")
});

/// Variables visible to an expression.
pub type EvalContext = serde_json::Map<String, serde_json::Value>;

/// Expression evaluation errors.
#[derive(Debug, Error)]
pub enum ExpressionError {
    /// The expression does not parse.
    #[error("Compilation error in '{expression}': {message}")]
    Compile { expression: String, message: String },

    /// The expression failed while running.
    #[error("Runtime error in '{expression}': {message}")]
    Runtime { expression: String, message: String },

    /// The sandbox limits were hit.
    #[error("Expression '{expression}' exceeded its operation budget")]
    LimitExceeded { expression: String },

    /// The result has a type the caller cannot use.
    #[error("Expression '{expression}' returned {found}, expected {expected}")]
    UnexpectedType {
        expression: String,
        expected: &'static str,
        found: String,
    },
}

/// Result type for expression evaluation.
pub type ExpressionResult<T> = Result<T, ExpressionError>;

/// Evaluates an expression string against a variable map.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expression`. `Null` means "no value".
    fn evaluate(&self, expression: &str, context: &EvalContext)
        -> ExpressionResult<serde_json::Value>;

    /// Short name used in logs.
    fn evaluator_type(&self) -> &'static str;

    /// Evaluate to a single string, or `None` when the result is empty.
    fn evaluate_string(
        &self,
        expression: &str,
        context: &EvalContext,
    ) -> ExpressionResult<Option<String>> {
        match self.evaluate(expression, context)? {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::String(s) if s.is_empty() => Ok(None),
            serde_json::Value::String(s) => Ok(Some(s)),
            serde_json::Value::Bool(b) => Ok(Some(b.to_string())),
            serde_json::Value::Number(n) => Ok(Some(n.to_string())),
            other => Err(ExpressionError::UnexpectedType {
                expression: expression.to_string(),
                expected: "string",
                found: json_type(&other).to_string(),
            }),
        }
    }

    /// Evaluate a condition.
    ///
    /// The literals `"true"` and `"false"` short-circuit without evaluation.
    fn evaluate_bool(&self, expression: &str, context: &EvalContext) -> ExpressionResult<bool> {
        match expression.trim() {
            "true" => return Ok(true),
            "false" | "" => return Ok(false),
            _ => {}
        }
        match self.evaluate(expression, context)? {
            serde_json::Value::Bool(b) => Ok(b),
            serde_json::Value::String(s) => Ok(s.eq_ignore_ascii_case("true")),
            serde_json::Value::Null => Ok(false),
            other => Err(ExpressionError::UnexpectedType {
                expression: expression.to_string(),
                expected: "boolean",
                found: json_type(&other).to_string(),
            }),
        }
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// `${name}` placeholder substitution.
///
/// Unknown placeholders are replaced with nothing. If the expression has
/// placeholders and none of them resolve, the result is `Null`. Multi-valued
/// variables are joined with commas.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateEvaluator;

impl TemplateEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn render(value: &serde_json::Value) -> Option<String> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => {
                let parts: Vec<String> = items.iter().filter_map(Self::render).collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(","))
                }
            }
            other => Some(other.to_string()),
        }
    }
}

impl ExpressionEvaluator for TemplateEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        context: &EvalContext,
    ) -> ExpressionResult<serde_json::Value> {
        let mut has_placeholder = false;
        let mut has_value = false;

        let result = PLACEHOLDER_RE
            .replace_all(expression, |caps: &regex::Captures<'_>| {
                has_placeholder = true;
                match context.get(&caps[1]).and_then(Self::render) {
                    Some(value) => {
                        has_value = true;
                        value
                    }
                    None => String::new(),
                }
            })
            .into_owned();

        if has_placeholder && !has_value {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::Value::String(result))
    }

    fn evaluator_type(&self) -> &'static str {
        "template"
    }
}

/// Default maximum number of operations in the Rhai engine.
const DEFAULT_MAX_OPERATIONS: u64 = 10_000;

/// Default maximum call stack depth.
const DEFAULT_MAX_CALL_STACK_DEPTH: usize = 32;

/// Default maximum string size in bytes.
const DEFAULT_MAX_STRING_SIZE: usize = 65536;

/// Default maximum array size.
const DEFAULT_MAX_ARRAY_SIZE: usize = 1_000;

/// Limits applied to every Rhai evaluation.
#[derive(Debug, Clone)]
pub struct RhaiEvaluatorConfig {
    pub max_operations: u64,
    pub max_call_stack_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
}

impl Default for RhaiEvaluatorConfig {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_MAX_OPERATIONS,
            max_call_stack_depth: DEFAULT_MAX_CALL_STACK_DEPTH,
            max_string_size: DEFAULT_MAX_STRING_SIZE,
            max_array_size: DEFAULT_MAX_ARRAY_SIZE,
        }
    }
}

/// Rhai-backed evaluator.
///
/// A fresh sandboxed engine is built for each evaluation, so evaluations
/// share no state. Context variables are pushed as constants and undeclared
/// variables are a compile error.
pub struct RhaiEvaluator {
    config: RhaiEvaluatorConfig,
}

impl RhaiEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RhaiEvaluatorConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(config: RhaiEvaluatorConfig) -> Self {
        Self { config }
    }

    fn create_engine(&self) -> Engine {
        let mut engine = Engine::new();

        engine.set_max_operations(self.config.max_operations);
        engine.set_max_call_levels(self.config.max_call_stack_depth);
        engine.set_max_string_size(self.config.max_string_size);
        engine.set_max_array_size(self.config.max_array_size);
        engine.set_strict_variables(true);

        engine.register_fn("log_info", |msg: &str| {
            info!(script_log = %msg, "Expression log");
        });
        engine.register_fn("log_debug", |msg: &str| {
            debug!(script_log = %msg, "Expression debug");
        });

        engine
    }

    fn build_scope(context: &EvalContext) -> Scope<'static> {
        let mut scope = Scope::new();
        for (name, value) in context {
            match rhai::serde::to_dynamic(value) {
                Ok(dynamic) => {
                    scope.push_constant_dynamic(name.clone(), dynamic);
                }
                Err(e) => {
                    warn!(variable = %name, error = %e, "Skipping expression variable");
                }
            }
        }
        scope
    }
}

impl Default for RhaiEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEvaluator for RhaiEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        context: &EvalContext,
    ) -> ExpressionResult<serde_json::Value> {
        let engine = self.create_engine();
        let mut scope = Self::build_scope(context);

        // Compile with the scope so strict variables can see the constants.
        let ast = engine
            .compile_with_scope(&scope, expression)
            .map_err(|e| ExpressionError::Compile {
                expression: expression.to_string(),
                message: e.to_string(),
            })?;

        let result = engine
            .eval_ast_with_scope::<rhai::Dynamic>(&mut scope, &ast)
            .map_err(|e| match *e {
                rhai::EvalAltResult::ErrorTooManyOperations(_) => ExpressionError::LimitExceeded {
                    expression: expression.to_string(),
                },
                other => ExpressionError::Runtime {
                    expression: expression.to_string(),
                    message: other.to_string(),
                },
            })?;

        if result.is_unit() {
            return Ok(serde_json::Value::Null);
        }

        rhai::serde::from_dynamic::<serde_json::Value>(&result).map_err(|e| {
            ExpressionError::UnexpectedType {
                expression: expression.to_string(),
                expected: "serializable value",
                found: e.to_string(),
            }
        })
    }

    fn evaluator_type(&self) -> &'static str {
        "rhai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> EvalContext {
        let mut ctx = EvalContext::new();
        ctx.insert("username".to_string(), json!("jdoe"));
        ctx.insert("firstname".to_string(), json!("John"));
        ctx.insert("mail".to_string(), json!(["a@example.com", "b@example.com"]));
        ctx.insert("age".to_string(), json!(42));
        ctx
    }

    #[test]
    fn test_template_substitution() {
        let eval = TemplateEvaluator::new();
        let value = eval
            .evaluate("uid=${username},ou=people", &context())
            .unwrap();
        assert_eq!(value, json!("uid=jdoe,ou=people"));

        let value = eval.evaluate("${mail}", &context()).unwrap();
        assert_eq!(value, json!("a@example.com,b@example.com"));
    }

    #[test]
    fn test_template_evaluators_share_placeholder_pattern() {
        let first = TemplateEvaluator::new();
        let second = TemplateEvaluator::new();
        for _ in 0..3 {
            assert_eq!(
                first.evaluate("${username}.${age}", &context()).unwrap(),
                json!("jdoe.42")
            );
            assert_eq!(
                second.evaluate("cn=${firstname}", &context()).unwrap(),
                json!("cn=John")
            );
        }
    }

    #[test]
    fn test_template_unresolved_is_null() {
        let eval = TemplateEvaluator::new();
        assert_eq!(eval.evaluate("${missing}", &context()).unwrap(), json!(null));
        assert_eq!(
            eval.evaluate_string("cn=${missing}", &context()).unwrap(),
            None
        );
        assert_eq!(
            eval.evaluate("constant", &context()).unwrap(),
            json!("constant")
        );
    }

    #[test]
    fn test_rhai_string_expression() {
        let eval = RhaiEvaluator::new();
        let value = eval
            .evaluate_string("\"uid=\" + username + \",ou=people,o=isp\"", &context())
            .unwrap();
        assert_eq!(value.as_deref(), Some("uid=jdoe,ou=people,o=isp"));
    }

    #[test]
    fn test_rhai_array_and_numbers() {
        let eval = RhaiEvaluator::new();
        assert_eq!(eval.evaluate("mail.len()", &context()).unwrap(), json!(2));
        assert_eq!(eval.evaluate("age + 1", &context()).unwrap(), json!(43));
    }

    #[test]
    fn test_rhai_unknown_variable_is_compile_error() {
        let eval = RhaiEvaluator::new();
        let err = eval.evaluate("surname + 1", &context()).unwrap_err();
        assert!(matches!(err, ExpressionError::Compile { .. }));
    }

    #[test]
    fn test_rhai_operation_budget() {
        let eval = RhaiEvaluator::with_config(RhaiEvaluatorConfig {
            max_operations: 100,
            ..Default::default()
        });
        let err = eval
            .evaluate("let x = 0; loop { x += 1; }", &context())
            .unwrap_err();
        assert!(matches!(err, ExpressionError::LimitExceeded { .. }));
    }

    #[test]
    fn test_evaluate_bool() {
        let eval = RhaiEvaluator::new();
        assert!(eval.evaluate_bool("true", &context()).unwrap());
        assert!(!eval.evaluate_bool("false", &context()).unwrap());
        assert!(eval.evaluate_bool("age > 40", &context()).unwrap());
        assert!(!eval.evaluate_bool("username == \"other\"", &context()).unwrap());
        assert!(eval.evaluate_bool("age", &context()).is_err());
    }
}
