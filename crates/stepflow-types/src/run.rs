//! Execution tracking types: runs, per-step results, and runtime state.
//!
//! An `ExecutionRun` is the single JSON envelope the harness prints on
//! stdout for `run` and `resume`. Nothing here is persisted by the core;
//! the embedding host stores runs and hands runtime state back on resume.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Terminal (or suspended) status of an execution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    NeedsApproval,
    Cancelled,
    Failed,
}

/// Status of an individual step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    WaitingApproval,
}

// ---------------------------------------------------------------------------
// StepResult
// ---------------------------------------------------------------------------

/// Outcome of one step within an execution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// Step ID matching `Step.id`.
    pub step_id: String,
    /// Current step status.
    pub status: StepStatus,
    /// Attempt number (1-based; increments on retry, and labels loop
    /// iterations for steps inside a loop body).
    pub attempt: u32,
    /// When step execution started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When step execution completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Opaque step output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error message if the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// A fresh result for a step that has not produced anything yet.
    pub fn new(step_id: impl Into<String>, status: StepStatus, attempt: u32) -> Self {
        Self {
            step_id: step_id.into(),
            status,
            attempt,
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
        }
    }

    /// A `skipped` result for an untaken-branch step, recorded so audit
    /// trails account for every id in the step order.
    pub fn skipped(step_id: impl Into<String>) -> Self {
        Self::new(step_id, StepStatus::Skipped, 1)
    }
}

// ---------------------------------------------------------------------------
// ApprovalRequest
// ---------------------------------------------------------------------------

/// The suspension record returned when an approval step pauses a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    /// The approval step the run is paused at.
    pub step_id: String,
    /// The approval step's message, shown to the human reviewer.
    pub prompt: String,
    /// Items under review, verbatim from the step definition.
    #[serde(default)]
    pub items: Vec<Value>,
    /// Credential binding a future resume call to this exact checkpoint.
    pub resume_token: String,
}

// ---------------------------------------------------------------------------
// ExecutionRun
// ---------------------------------------------------------------------------

/// One invocation of the engine: the stdout result envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRun {
    /// Caller-supplied opaque execution id.
    pub execution_id: String,
    /// Terminal or suspended status.
    pub status: RunStatus,
    /// Variable bindings produced by steps with an `outputVariable`.
    pub output: BTreeMap<String, Value>,
    /// Per-step outcomes in execution order.
    pub steps: Vec<StepResult>,
    /// Present iff `status == needs_approval`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_approval: Option<ApprovalRequest>,
    /// Terminal error, prefix-encoded for programmatic matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// RuntimeState
// ---------------------------------------------------------------------------

/// Caller-persisted snapshot of a suspended run, handed back via the
/// payload's `runtime` field so completed work is not re-executed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeState {
    /// The approval step the run paused at, if suspended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_step_id: Option<String>,
    /// Variable bindings accumulated before the pause.
    #[serde(default)]
    pub output: BTreeMap<String, Value>,
    /// Step results recorded before the pause.
    #[serde(default)]
    pub steps: Vec<StepResult>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
