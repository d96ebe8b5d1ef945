//! `stepflow resume`: continue or cancel a suspended execution.
//!
//! Deny is a pure control decision: it needs neither workflow content nor
//! stdin, and yields a `cancelled` envelope with exit 0. Approve replays
//! the persisted runtime state through the engine exactly like `run`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use stepflow_core::canonical::normalize_hash;
use stepflow_core::compiler;
use stepflow_core::engine::{failed_run, Engine, RunInput};
use stepflow_types::error::EngineError;
use stepflow_types::run::{ExecutionRun, RunStatus};

use crate::cli::Decision;
use crate::events::StderrSink;
use crate::host::LiveHost;

use super::{
    print_result, read_stdin, usage_error, RunPayload, EXIT_EXECUTION, EXIT_INVALID_INPUT,
    EXIT_OK, EXIT_USAGE,
};

pub async fn execute(
    execution_id: Option<String>,
    resume_token: Option<String>,
    decision: Decision,
    workflow_hash: Option<String>,
    workspace: Option<PathBuf>,
) -> anyhow::Result<i32> {
    let (Some(execution_id), Some(resume_token)) = (execution_id, resume_token) else {
        return Ok(usage_error(
            "resume requires --execution-id and --resume-token",
        ));
    };

    if decision == Decision::Deny {
        let envelope = ExecutionRun {
            execution_id,
            status: RunStatus::Cancelled,
            output: BTreeMap::new(),
            steps: Vec::new(),
            requires_approval: None,
            error: Some(EngineError::ApprovalDenied.to_string()),
        };
        print_result(&envelope)?;
        return Ok(EXIT_OK);
    }

    let (Some(workflow_hash), Some(workspace)) = (workflow_hash, workspace) else {
        return Ok(usage_error(
            "resume --decision approve requires --workflow-hash and --workspace",
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
    input.runtime = payload.runtime;
    let run = engine.resume(&workflow, input, &resume_token).await;

    print_result(&run)?;
    Ok(if run.status == RunStatus::Failed {
        EXIT_EXECUTION
    } else {
        EXIT_OK
    })
}
