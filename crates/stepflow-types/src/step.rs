//! The workflow step model.
//!
//! A workflow is a tree of typed steps. `Step` carries the fields every step
//! shares (`id`, `name`, `outputVariable`, retry policy) and a `StepKind`
//! tagged variant for the per-type payload. The compiler is the only place
//! that constructs these from raw JSON; downstream code never re-checks
//! `type` strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A single step in a workflow tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// User-defined step ID (e.g. "gather-news"). Required, non-empty.
    pub id: String,
    /// Human-readable step name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Variable name the step's result is bound to in the run output.
    #[serde(
        rename = "outputVariable",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub output_variable: Option<String>,
    /// Retry policy for this step (action steps only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    /// The kind of step and its type-specific payload.
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    /// The wire name of this step's type (matches the authored `type` field).
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            StepKind::Agent { .. } => "agent",
            StepKind::AgentMessage { .. } => "agent_message",
            StepKind::Tool { .. } => "tool",
            StepKind::Bash { .. } => "bash",
            StepKind::Conditional { .. } => "conditional",
            StepKind::Loop { .. } => "loop",
            StepKind::Parallel { .. } => "parallel",
            StepKind::Subworkflow { .. } => "subworkflow",
            StepKind::Approval { .. } => "approval",
        }
    }
}

/// The kind of step, internally tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Delegate a goal to an agent session.
    Agent {
        goal: String,
    },
    /// Send a message into an agent session, optionally awaiting a reply.
    AgentMessage {
        content: String,
        #[serde(default)]
        await_response: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        await_timeout_ms: Option<u64>,
    },
    /// Invoke a named tool.
    Tool {
        tool: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    /// Run a shell command in the workspace.
    Bash {
        command: String,
    },
    /// Branch on an opaque condition; exactly one branch executes.
    Conditional {
        condition: Value,
        #[serde(rename = "then", default)]
        then_steps: Vec<Step>,
        #[serde(rename = "else", default)]
        else_steps: Vec<Step>,
    },
    /// Repeat a body until the condition is false or the bound is hit.
    Loop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<Value>,
        #[serde(
            rename = "maxIterations",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        max_iterations: Option<u32>,
        steps: Vec<Step>,
    },
    /// Execute child steps concurrently.
    Parallel {
        steps: Vec<Step>,
    },
    /// Compile and execute a referenced workflow.
    Subworkflow {
        #[serde(
            rename = "workflowId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        workflow_id: Option<String>,
        /// Inline child definition, raw. Recompiled at execution time.
        #[serde(rename = "workflow", default, skip_serializing_if = "Option::is_none")]
        definition: Option<Value>,
        /// Typed view of the inline definition's steps, used for step-order
        /// and audit bookkeeping. Empty for id-referenced children.
        #[serde(skip)]
        steps: Vec<Step>,
    },
    /// Human approval checkpoint; suspends the run until resumed.
    Approval {
        message: String,
        #[serde(rename = "timeoutAt", default, skip_serializing_if = "Option::is_none")]
        timeout_at: Option<String>,
        #[serde(
            rename = "defaultAction",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        default_action: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        items: Vec<Value>,
    },
}

/// Retry policy for an action step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (1-based; 1 means no retry).
    #[serde(rename = "maxAttempts")]
    pub max_attempts: u32,
}

// ---------------------------------------------------------------------------
// Traversal helpers
// ---------------------------------------------------------------------------

/// Collect every step id in the given steps, depth-first in document order.
///
/// This is the traversal the compiler uses for `stepOrder`: each node's own
/// id, then its children (`then` before `else` for conditionals, bodies for
/// loop/parallel/subworkflow) recursively.
pub fn collect_step_ids(steps: &[Step], out: &mut Vec<String>) {
    for step in steps {
        out.push(step.id.clone());
        match &step.kind {
            StepKind::Conditional {
                then_steps,
                else_steps,
                ..
            } => {
                collect_step_ids(then_steps, out);
                collect_step_ids(else_steps, out);
            }
            StepKind::Loop { steps, .. }
            | StepKind::Parallel { steps }
            | StepKind::Subworkflow { steps, .. } => {
                collect_step_ids(steps, out);
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
