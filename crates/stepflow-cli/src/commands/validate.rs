//! `stepflow validate`: compile only, reporting hash, step order, and any
//! validation errors. Never executes anything.

use std::path::PathBuf;

use serde_json::{json, Value};

use stepflow_core::compiler;

use super::{print_result, read_stdin, usage_error, EXIT_INVALID_INPUT, EXIT_OK};

pub async fn execute(
    workflow_path: Option<PathBuf>,
    workflow_json: Option<String>,
) -> anyhow::Result<i32> {
    let source = match (workflow_path, workflow_json) {
        (Some(path), None) => match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                print_invalid(vec![format!("cannot read {}: {err}", path.display())])?;
                return Ok(EXIT_INVALID_INPUT);
            }
        },
        (None, Some(inline)) if inline == "-" => read_stdin()?,
        (None, Some(inline)) => inline,
        _ => {
            return Ok(usage_error(
                "validate requires exactly one of --workflow-path or --workflow-json",
            ));
        }
    };

    let raw: Value = match serde_json::from_str(&source) {
        Ok(raw) => raw,
        Err(err) => {
            print_invalid(vec![format!("invalid JSON: {err}")])?;
            return Ok(EXIT_INVALID_INPUT);
        }
    };

    let outcome = compiler::compile(&raw);
    match outcome.workflow {
        Some(workflow) => {
            print_result(&json!({
                "ok": true,
                "status": "valid",
                "workflowHash": workflow.workflow_hash,
                "stepOrder": workflow.step_order,
                "errors": [],
            }))?;
            Ok(EXIT_OK)
        }
        None => {
            print_invalid(outcome.error_strings())?;
            Ok(EXIT_INVALID_INPUT)
        }
    }
}

fn print_invalid(errors: Vec<String>) -> anyhow::Result<()> {
    print_result(&json!({
        "ok": false,
        "status": "invalid",
        "workflowHash": null,
        "stepOrder": [],
        "errors": errors,
    }))
}
