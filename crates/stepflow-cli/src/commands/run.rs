//! `stepflow run`: compile the stdin workflow, gate on the expected hash,
//! and execute it.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use stepflow_core::canonical::normalize_hash;
use stepflow_core::compiler;
use stepflow_core::engine::{failed_run, Engine, RunInput};
use stepflow_types::error::EngineError;
use stepflow_types::run::RunStatus;

use crate::events::StderrSink;
use crate::host::LiveHost;

use super::{
    print_result, read_stdin, usage_error, RunPayload, EXIT_EXECUTION, EXIT_INVALID_INPUT,
    EXIT_OK, EXIT_USAGE,
};

pub async fn execute(
    execution_id: Option<String>,
    workflow_hash: Option<String>,
    workspace: Option<PathBuf>,
) -> anyhow::Result<i32> {
    let (Some(execution_id), Some(workflow_hash), Some(workspace)) =
        (execution_id, workflow_hash, workspace)
    else {
        return Ok(usage_error(
            "run requires --execution-id, --workflow-hash, and --workspace",
        ));
    };

    let raw = read_stdin()?;
    let payload: RunPayload = match serde_json::from_str(&raw) {
        Ok(payload) => payload,
        Err(err) => {
            print_result(&failed_run(
                &execution_id,
                format!("invalid JSON payload: {err}"),
            ))?;
            return Ok(EXIT_INVALID_INPUT);
        }
    };
    let Some(workflow_raw) = payload.workflow else {
        print_result(&failed_run(
            &execution_id,
            "payload is missing workflow".to_string(),
        ))?;
        return Ok(EXIT_INVALID_INPUT);
    };

    let outcome = compiler::compile(&workflow_raw);
    let Some(workflow) = outcome.workflow else {
        let errors = outcome.error_strings();
        print_result(&json!({
            "executionId": execution_id,
            "status": "failed",
            "output": {},
            "steps": [],
            "error": EngineError::Compile(errors.join("; ")).to_string(),
            "errors": errors,
        }))?;
        return Ok(EXIT_INVALID_INPUT);
    };

    // Caller and engine must agree on what is being run before anything
    // executes.
    let expected = normalize_hash(&workflow_hash);
    if expected != workflow.workflow_hash {
        let error = EngineError::HashMismatch {
            expected,
            computed: workflow.workflow_hash.clone(),
        };
        print_result(&failed_run(&execution_id, error.to_string()))?;
        return Ok(EXIT_USAGE);
    }

    let engine = Engine::new(Arc::new(LiveHost::new(workspace)), Arc::new(StderrSink));
    let mut input = RunInput::new(execution_id);
    input.trigger = payload.trigger;
    input.variables = payload.variables;
    let run = engine.run(&workflow, input).await;

    print_result(&run)?;
    Ok(if run.status == RunStatus::Failed {
        EXIT_EXECUTION
    } else {
        EXIT_OK
    })
}
