//! `stepflow propose`: package a change intent into a proposal record.
//!
//! The record feeds a separate review/diff pipeline; this command only
//! shapes and announces it. No compilation or execution happens here.

use chrono::Utc;
use serde_json::json;

use stepflow_core::canonical::normalize_hash;
use stepflow_types::event::EngineEvent;

use crate::events::StderrSink;

use super::{print_result, usage_error, EXIT_OK};

pub fn execute(
    workflow_id: Option<String>,
    base_hash: Option<String>,
    intent: Option<String>,
) -> anyhow::Result<i32> {
    let (Some(workflow_id), Some(base_hash), Some(intent)) = (workflow_id, base_hash, intent)
    else {
        return Ok(usage_error(
            "propose requires --workflow-id, --base-hash, and --intent",
        ));
    };

    let base_hash = normalize_hash(&base_hash);
    StderrSink::emit_event(&EngineEvent::ProposalCreated {
        workflow_id: workflow_id.clone(),
        base_hash: base_hash.clone(),
        ts: Utc::now(),
    });

    print_result(&json!({
        "workflowId": workflow_id,
        "baseHash": base_hash,
        "proposedWorkflow": null,
        "summary": intent,
        "riskLevel": "unknown",
        "diff": null,
    }))?;
    Ok(EXIT_OK)
}
