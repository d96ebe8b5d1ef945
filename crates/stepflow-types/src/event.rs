//! Engine events streamed to standard error as newline-delimited JSON.
//!
//! The event stream is the harness's side channel: a supervising process can
//! tail these without parsing the final stdout result line. Event `type`
//! values are dotted names (`execution.started`, `step.completed`, ...).

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::run::{RunStatus, StepStatus};

/// A single observability event emitted during compilation or execution.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    #[serde(rename = "execution.started")]
    #[serde(rename_all = "camelCase")]
    ExecutionStarted {
        execution_id: String,
        workflow_hash: String,
        ts: DateTime<Utc>,
    },

    #[serde(rename = "step.started")]
    #[serde(rename_all = "camelCase")]
    StepStarted {
        execution_id: String,
        step_id: String,
        step_type: String,
        attempt: u32,
        ts: DateTime<Utc>,
    },

    #[serde(rename = "step.completed")]
    #[serde(rename_all = "camelCase")]
    StepCompleted {
        execution_id: String,
        step_id: String,
        status: StepStatus,
        ts: DateTime<Utc>,
    },

    #[serde(rename = "step.failed")]
    #[serde(rename_all = "camelCase")]
    StepFailed {
        execution_id: String,
        step_id: String,
        error: String,
        ts: DateTime<Utc>,
    },

    #[serde(rename = "execution.finished")]
    #[serde(rename_all = "camelCase")]
    ExecutionFinished {
        execution_id: String,
        status: RunStatus,
        ts: DateTime<Utc>,
    },

    #[serde(rename = "proposal.created")]
    #[serde(rename_all = "camelCase")]
    ProposalCreated {
        workflow_id: String,
        base_hash: String,
        ts: DateTime<Utc>,
    },
}
