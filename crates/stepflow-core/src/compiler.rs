//! Workflow compiler.
//!
//! Turns a raw JSON workflow definition into a [`CompiledWorkflow`]: a
//! structurally validated step tree, the canonical form of the definition,
//! its content hash, and the deterministic step order.
//!
//! Validation is a recursive descent over the untyped JSON. Each error is
//! path-qualified (`workflow.steps[0].then[1].type is required`) so the
//! author can locate it. Within one subtree the walk stops at the first
//! structural error; sibling subtrees are still validated, so a single pass
//! surfaces one issue per broken step.

use serde_json::Value;

use stepflow_types::step::{collect_step_ids, RetryPolicy, Step, StepKind};
use stepflow_types::workflow::CompiledWorkflow;

use crate::canonical::{canonicalize, content_hash};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// One validation failure, qualified with the JSON path it occurred at.
#[derive(Debug, Clone)]
pub struct CompileIssue {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for CompileIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.path, self.message)
    }
}

/// The result of a compilation attempt.
///
/// `ok` with a workflow, or a non-empty list of issues. Compilation is never
/// partial: a definition with any structural error produces no workflow.
#[derive(Debug)]
pub struct CompileOutcome {
    pub ok: bool,
    pub workflow: Option<CompiledWorkflow>,
    pub errors: Vec<CompileIssue>,
}

impl CompileOutcome {
    fn failed(errors: Vec<CompileIssue>) -> Self {
        Self {
            ok: false,
            workflow: None,
            errors,
        }
    }

    /// Rendered error strings, for envelopes and logs.
    pub fn error_strings(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}

// ---------------------------------------------------------------------------
// Compile
// ---------------------------------------------------------------------------

/// Compile a raw workflow definition.
pub fn compile(raw: &Value) -> CompileOutcome {
    let mut errors = Vec::new();

    let Some(obj) = raw.as_object() else {
        errors.push(issue("workflow", " must be an object"));
        return CompileOutcome::failed(errors);
    };

    for field in ["name", "description", "version"] {
        if let Some(v) = obj.get(field) {
            if !v.is_string() {
                errors.push(issue(&format!("workflow.{field}"), " must be a string"));
            }
        }
    }

    let steps = match obj.get("steps") {
        Some(Value::Array(items)) if !items.is_empty() => {
            let mut steps = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                if let Some(step) = parse_step(item, &format!("workflow.steps[{i}]"), &mut errors)
                {
                    steps.push(step);
                }
            }
            steps
        }
        _ => {
            errors.push(issue("workflow.steps", " must be a non-empty array"));
            Vec::new()
        }
    };

    if !errors.is_empty() {
        return CompileOutcome::failed(errors);
    }

    let canonical = canonicalize(raw);
    let workflow_hash = content_hash(raw);
    let mut step_order = Vec::new();
    collect_step_ids(&steps, &mut step_order);

    CompileOutcome {
        ok: true,
        workflow: Some(CompiledWorkflow {
            name: str_field(obj, "name"),
            description: str_field(obj, "description"),
            version: str_field(obj, "version"),
            canonical,
            workflow_hash,
            step_order,
            steps,
        }),
        errors: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Step parsing
// ---------------------------------------------------------------------------

/// Validate one step and build its typed form.
///
/// Pushes at most one issue per call: the first structural error found in
/// this step stops the descent into it. Returns `None` on any error.
fn parse_step(value: &Value, path: &str, errors: &mut Vec<CompileIssue>) -> Option<Step> {
    let before = errors.len();

    let Some(obj) = value.as_object() else {
        errors.push(issue(path, " must be an object"));
        return None;
    };

    let id = match obj.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            errors.push(issue(&format!("{path}.id"), " is required"));
            return None;
        }
    };

    let Some(kind_name) = obj.get("type").and_then(Value::as_str) else {
        errors.push(issue(&format!("{path}.type"), " is required"));
        return None;
    };

    let kind = match kind_name {
        "agent" => {
            let goal = require_string(obj, "goal", path, "agent step requires goal", errors)?;
            StepKind::Agent { goal }
        }
        "agent_message" => parse_agent_message(obj, path, errors)?,
        "tool" => {
            let tool = require_string(obj, "tool", path, "tool step requires tool", errors)?;
            if tool == "bash" {
                errors.push(issue(
                    path,
                    ": tool step must not invoke bash directly; use a bash step",
                ));
                return None;
            }
            StepKind::Tool {
                tool,
                input: obj.get("input").cloned(),
            }
        }
        "bash" => {
            let command =
                require_string(obj, "command", path, "bash step requires command", errors)?;
            StepKind::Bash { command }
        }
        "conditional" => {
            let Some(condition) = obj.get("condition") else {
                errors.push(issue(path, ": conditional step requires condition"));
                return None;
            };
            let condition = condition.clone();
            let then_steps = parse_branch(obj, "then", path, errors)?;
            let else_steps = parse_branch(obj, "else", path, errors)?;
            StepKind::Conditional {
                condition,
                then_steps,
                else_steps,
            }
        }
        "loop" => {
            let max_iterations = match obj.get("maxIterations") {
                None => None,
                Some(v) => match v.as_u64().map(u32::try_from) {
                    Some(Ok(n)) => Some(n),
                    Some(Err(_)) => {
                        errors.push(issue(
                            &format!("{path}.maxIterations"),
                            &format!(" must be at most {}", u32::MAX),
                        ));
                        return None;
                    }
                    None => {
                        errors.push(issue(
                            &format!("{path}.maxIterations"),
                            " must be a number",
                        ));
                        return None;
                    }
                },
            };
            let steps = require_steps(obj, path, "loop step requires steps", errors)?;
            StepKind::Loop {
                condition: obj.get("condition").cloned(),
                max_iterations,
                steps,
            }
        }
        "parallel" => {
            let steps = require_steps(obj, path, "parallel step requires steps", errors)?;
            StepKind::Parallel { steps }
        }
        "subworkflow" => parse_subworkflow(obj, path, errors)?,
        "approval" => {
            let message =
                require_string(obj, "message", path, "approval step requires message", errors)?;
            StepKind::Approval {
                message,
                timeout_at: str_field(obj, "timeoutAt"),
                default_action: str_field(obj, "defaultAction"),
                items: obj
                    .get("items")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
            }
        }
        other => {
            errors.push(issue(
                &format!("{path}.type"),
                &format!(" \"{other}\" is not a recognized step type"),
            ));
            return None;
        }
    };

    if let Some(v) = obj.get("outputVariable") {
        if !v.is_string() {
            errors.push(issue(
                &format!("{path}.outputVariable"),
                " must be a string",
            ));
        }
    }

    let retry = match obj.get("retry") {
        None => None,
        Some(v) => match v
            .get("maxAttempts")
            .and_then(Value::as_u64)
            .map(u32::try_from)
        {
            Some(Ok(n)) if n >= 1 => Some(RetryPolicy { max_attempts: n }),
            _ => {
                errors.push(issue(
                    &format!("{path}.retry.maxAttempts"),
                    &format!(" must be a number between 1 and {}", u32::MAX),
                ));
                None
            }
        },
    };

    if errors.len() > before {
        return None;
    }

    Some(Step {
        id,
        name: str_field(obj, "name"),
        output_variable: str_field(obj, "outputVariable"),
        retry,
        kind,
    })
}

/// `agent_message` accepts its text under `content`, `message`, or `goal`.
fn parse_agent_message(
    obj: &serde_json::Map<String, Value>,
    path: &str,
    errors: &mut Vec<CompileIssue>,
) -> Option<StepKind> {
    let content = ["content", "message", "goal"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty());
    let Some(content) = content else {
        errors.push(issue(
            path,
            ": agent_message step requires content (one of content, message, goal)",
        ));
        return None;
    };

    let await_response = match obj.get("await_response") {
        None => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => {
            errors.push(issue(
                &format!("{path}.await_response"),
                " must be a boolean",
            ));
            return None;
        }
    };

    let await_timeout_ms = match obj.get("await_timeout_ms") {
        None => None,
        Some(v) => {
            let Some(ms) = v.as_u64() else {
                errors.push(issue(
                    &format!("{path}.await_timeout_ms"),
                    " must be a number",
                ));
                return None;
            };
            if ms < 1000 {
                errors.push(issue(
                    &format!("{path}.await_timeout_ms"),
                    " must be at least 1000",
                ));
                return None;
            }
            if await_response.is_none() {
                errors.push(issue(
                    &format!("{path}.await_timeout_ms"),
                    " is set but await_response is missing (await_response must be a boolean)",
                ));
                return None;
            }
            Some(ms)
        }
    };

    Some(StepKind::AgentMessage {
        content: content.to_string(),
        await_response: await_response.unwrap_or(false),
        await_timeout_ms,
    })
}

fn parse_subworkflow(
    obj: &serde_json::Map<String, Value>,
    path: &str,
    errors: &mut Vec<CompileIssue>,
) -> Option<StepKind> {
    let workflow_id = str_field(obj, "workflowId");
    let definition = obj.get("workflow").cloned();

    if workflow_id.is_none() && definition.is_none() {
        errors.push(issue(path, ": subworkflow step requires workflowId or workflow"));
        return None;
    }

    // Inline children are validated in place; id-referenced children are
    // resolved and compiled at execution time.
    let mut steps = Vec::new();
    if let Some(def) = &definition {
        let before = errors.len();
        match def.get("steps").and_then(Value::as_array) {
            Some(items) if !items.is_empty() => {
                for (i, item) in items.iter().enumerate() {
                    if let Some(step) =
                        parse_step(item, &format!("{path}.workflow.steps[{i}]"), errors)
                    {
                        steps.push(step);
                    }
                }
            }
            _ => {
                errors.push(issue(
                    &format!("{path}.workflow.steps"),
                    " must be a non-empty array",
                ));
            }
        }
        if errors.len() > before {
            return None;
        }
    }

    Some(StepKind::Subworkflow {
        workflow_id,
        definition,
        steps,
    })
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn issue(path: &str, message: &str) -> CompileIssue {
    CompileIssue {
        path: path.to_string(),
        message: message.to_string(),
    }
}

fn str_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn require_string(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    path: &str,
    message: &str,
    errors: &mut Vec<CompileIssue>,
) -> Option<String> {
    match obj.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Some(s.to_string()),
        _ => {
            errors.push(issue(path, &format!(": {message}")));
            None
        }
    }
}

/// A required, non-empty child `steps` array, recursively parsed.
fn require_steps(
    obj: &serde_json::Map<String, Value>,
    path: &str,
    message: &str,
    errors: &mut Vec<CompileIssue>,
) -> Option<Vec<Step>> {
    let before = errors.len();
    match obj.get("steps").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => {
            let mut steps = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                if let Some(step) = parse_step(item, &format!("{path}.steps[{i}]"), errors) {
                    steps.push(step);
                }
            }
            if errors.len() > before {
                None
            } else {
                Some(steps)
            }
        }
        _ => {
            errors.push(issue(path, &format!(": {message}")));
            None
        }
    }
}

/// An optional branch array (`then`/`else`), recursively parsed.
fn parse_branch(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    path: &str,
    errors: &mut Vec<CompileIssue>,
) -> Option<Vec<Step>> {
    let before = errors.len();
    match obj.get(key) {
        None => Some(Vec::new()),
        Some(Value::Array(items)) => {
            let mut steps = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                if let Some(step) = parse_step(item, &format!("{path}.{key}[{i}]"), errors) {
                    steps.push(step);
                }
            }
            if errors.len() > before {
                None
            } else {
                Some(steps)
            }
        }
        Some(_) => {
            errors.push(issue(&format!("{path}.{key}"), " must be an array"));
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile_errors(raw: Value) -> Vec<String> {
        let outcome = compile(&raw);
        assert!(!outcome.ok);
        outcome.error_strings()
    }

    #[test]
    fn valid_workflow_compiles_with_hash_and_order() {
        let raw = json!({
            "name": "daily",
            "steps": [
                {"id": "lint", "type": "bash", "command": "cargo clippy"},
                {
                    "id": "gate",
                    "type": "conditional",
                    "condition": "steps.lint.ok",
                    "then": [{"id": "publish", "type": "bash", "command": "true"}],
                    "else": [{"id": "notify", "type": "agent_message", "content": "lint failed"}]
                }
            ]
        });
        let outcome = compile(&raw);
        assert!(outcome.ok, "errors: {:?}", outcome.errors);
        let wf = outcome.workflow.unwrap();
        assert!(wf.workflow_hash.starts_with("sha256:"));
        assert_eq!(wf.step_order, vec!["lint", "gate", "publish", "notify"]);
        assert_eq!(wf.name.as_deref(), Some("daily"));
    }

    #[test]
    fn hash_ignores_author_key_order() {
        let a = json!({"name": "wf", "steps": [{"id": "s", "type": "bash", "command": "true"}]});
        let b: Value = serde_json::from_str(
            r#"{"steps":[{"command":"true","id":"s","type":"bash"}],"name":"wf"}"#,
        )
        .unwrap();
        let ha = compile(&a).workflow.unwrap().workflow_hash;
        let hb = compile(&b).workflow.unwrap().workflow_hash;
        assert_eq!(ha, hb);
    }

    #[test]
    fn empty_steps_is_rejected() {
        let errors = compile_errors(json!({"steps": []}));
        assert!(errors
            .iter()
            .any(|e| e.contains("workflow.steps must be a non-empty array")));
    }

    #[test]
    fn missing_type_is_path_qualified() {
        let errors = compile_errors(json!({
            "steps": [{
                "id": "gate",
                "type": "conditional",
                "condition": true,
                "then": [
                    {"id": "a", "type": "bash", "command": "true"},
                    {"id": "b", "command": "true"}
                ]
            }]
        }));
        assert!(errors
            .iter()
            .any(|e| e.contains("workflow.steps[0].then[1].type is required")));
    }

    #[test]
    fn bash_requires_command() {
        let errors = compile_errors(json!({"steps": [{"id": "s", "type": "bash"}]}));
        assert!(errors.iter().any(|e| e.contains("bash step requires command")));
    }

    #[test]
    fn tool_named_bash_is_rejected() {
        let errors =
            compile_errors(json!({"steps": [{"id": "s", "type": "tool", "tool": "bash"}]}));
        assert!(errors
            .iter()
            .any(|e| e.contains("must not invoke bash directly")));
    }

    #[test]
    fn agent_message_requires_content() {
        let errors =
            compile_errors(json!({"steps": [{"id": "s", "type": "agent_message"}]}));
        assert!(errors
            .iter()
            .any(|e| e.contains("agent_message step requires content")));
    }

    #[test]
    fn agent_message_accepts_message_or_goal_as_content() {
        for key in ["content", "message", "goal"] {
            let raw = json!({"steps": [{"id": "s", "type": "agent_message", key: "hi"}]});
            assert!(compile(&raw).ok, "{key} should satisfy the content requirement");
        }
    }

    #[test]
    fn await_response_must_be_boolean() {
        let errors = compile_errors(json!({
            "steps": [{"id": "s", "type": "agent_message", "content": "hi", "await_response": "yes"}]
        }));
        assert!(errors
            .iter()
            .any(|e| e.contains("await_response must be a boolean")));
    }

    #[test]
    fn await_timeout_has_a_floor() {
        let errors = compile_errors(json!({
            "steps": [{
                "id": "s", "type": "agent_message", "content": "hi",
                "await_response": true, "await_timeout_ms": 10
            }]
        }));
        assert!(errors.iter().any(|e| e.contains("at least 1000")));
    }

    #[test]
    fn await_timeout_without_await_response_is_rejected() {
        let errors = compile_errors(json!({
            "steps": [{
                "id": "s", "type": "agent_message", "content": "hi",
                "await_timeout_ms": 5000
            }]
        }));
        assert!(errors
            .iter()
            .any(|e| e.contains("await_response must be a boolean")));
    }

    #[test]
    fn sibling_errors_are_all_reported() {
        let errors = compile_errors(json!({
            "steps": [
                {"id": "a", "type": "bash"},
                {"id": "b", "type": "tool"}
            ]
        }));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn subworkflow_requires_reference_or_inline() {
        let errors = compile_errors(json!({"steps": [{"id": "s", "type": "subworkflow"}]}));
        assert!(errors
            .iter()
            .any(|e| e.contains("subworkflow step requires workflowId or workflow")));
    }

    #[test]
    fn inline_subworkflow_children_join_step_order() {
        let raw = json!({
            "steps": [{
                "id": "inner",
                "type": "subworkflow",
                "workflow": {"steps": [{"id": "child", "type": "bash", "command": "true"}]}
            }]
        });
        let wf = compile(&raw).workflow.unwrap();
        assert_eq!(wf.step_order, vec!["inner", "child"]);
    }

    #[test]
    fn max_iterations_above_u32_is_rejected() {
        // 4294967297 would silently truncate to 1 under a lossy cast.
        let errors = compile_errors(json!({
            "steps": [{
                "id": "s", "type": "loop", "maxIterations": 4294967297u64,
                "steps": [{"id": "t", "type": "bash", "command": "true"}]
            }]
        }));
        assert!(errors
            .iter()
            .any(|e| e.contains("maxIterations must be at most 4294967295")));
    }

    #[test]
    fn retry_max_attempts_above_u32_is_rejected() {
        let errors = compile_errors(json!({
            "steps": [{
                "id": "s", "type": "bash", "command": "true",
                "retry": {"maxAttempts": 4294967297u64}
            }]
        }));
        assert!(errors
            .iter()
            .any(|e| e.contains("maxAttempts must be a number between 1 and 4294967295")));
    }

    #[test]
    fn unrecognized_type_is_rejected() {
        let errors = compile_errors(json!({"steps": [{"id": "s", "type": "teleport"}]}));
        assert!(errors
            .iter()
            .any(|e| e.contains("is not a recognized step type")));
    }
}
