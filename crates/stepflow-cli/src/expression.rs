//! JEXL condition evaluation for `conditional` and `loop` steps.
//!
//! Wraps `jexl_eval::Evaluator` with a few standard transforms and coerces
//! results to boolean with JavaScript-like truthiness. The evaluator is
//! built per call: it is not `Send`, and conditions are short expressions
//! where construction cost is noise.
//!
//! Payloads are always passed as context objects, never interpolated into
//! expression strings.

use serde_json::{json, Value};

/// Evaluate an expression string against a context object.
pub fn evaluate_bool(expression: &str, context: &Value) -> Result<bool, String> {
    let evaluator = jexl_eval::Evaluator::new()
        .with_transform("lower", |args: &[Value]| {
            let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(s.to_lowercase()))
        })
        .with_transform("contains", |args: &[Value]| {
            let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
            let search = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!(subject.contains(search)))
        })
        .with_transform("length", |args: &[Value]| {
            let val = args.first().cloned().unwrap_or(Value::Null);
            let len = match &val {
                Value::String(s) => s.len(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                _ => 0,
            };
            Ok(json!(len as f64))
        });

    let result = evaluator
        .eval_in_context(expression, context)
        .map_err(|e| format!("expression evaluation failed: {e}"))?;
    Ok(value_to_bool(&result))
}

/// Coerce a condition value to boolean.
///
/// Literal booleans and numbers pass through with JavaScript-like
/// truthiness; strings are JEXL expressions.
pub fn evaluate_condition(condition: &Value, context: &Value) -> Result<bool, String> {
    match condition {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0) != 0.0),
        Value::String(expr) => evaluate_bool(expr, context),
        Value::Array(_) | Value::Object(_) => Ok(true),
    }
}

fn value_to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
