//! Compiled workflow artifact.
//!
//! A `CompiledWorkflow` is produced once per distinct canonical content and
//! never mutated. Equality of `workflow_hash` is how the harness detects
//! drift between the definition queued at authoring time and the definition
//! supplied at execution time.

use serde::Serialize;
use serde_json::Value;

use crate::step::Step;

/// A validated, canonicalized, order-resolved workflow ready for execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledWorkflow {
    /// Workflow name, if authored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional longer description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Authoring-side version string, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Canonical JSON form: sorted object keys at every level, array order
    /// preserved. The hash is computed over this form's serialization.
    pub canonical: Value,
    /// `sha256:<lowercase hex>` of the canonical serialization.
    pub workflow_hash: String,
    /// Deterministic pre-order traversal of every step id in the tree.
    pub step_order: Vec<String>,
    /// The typed step tree.
    pub steps: Vec<Step>,
}

impl CompiledWorkflow {
    /// Number of steps in the full tree (every id in `step_order`).
    pub fn step_count(&self) -> usize {
        self.step_order.len()
    }
}
