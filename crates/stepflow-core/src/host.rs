//! The engine's seam to the outside world.
//!
//! The engine itself performs no I/O: every action step is dispatched
//! through [`StepHost`]. The trait is object-safe (boxed futures) so the
//! engine can hold it as `Arc<dyn StepHost>` and clone itself cheaply into
//! parallel branches.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use thiserror::Error;

/// A boxed future returned by host methods.
pub type HostFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, HostError>> + Send + 'a>>;

/// Errors from a host action.
#[derive(Debug, Error)]
pub enum HostError {
    /// The action ran and failed (nonzero exit, tool error, ...).
    #[error("{0}")]
    Action(String),

    /// The action did not complete within its deadline.
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// A referenced resource could not be found.
    #[error("{0} not found")]
    NotFound(String),
}

/// The side-effect surface the engine needs.
///
/// Each method returns the step's output value on success; the engine wraps
/// failures into the run's error taxonomy.
pub trait StepHost: Send + Sync {
    /// Run a shell command inside the workspace.
    fn run_bash<'a>(&'a self, command: &'a str) -> HostFuture<'a, Value>;

    /// Invoke a named tool with an optional input payload.
    fn run_tool<'a>(&'a self, tool: &'a str, input: Option<&'a Value>) -> HostFuture<'a, Value>;

    /// Delegate a goal to an agent session.
    fn send_agent<'a>(&'a self, goal: &'a str) -> HostFuture<'a, Value>;

    /// Send a message into an agent session. When `await_response` the
    /// returned future resolves with the reply; the engine applies the
    /// timeout.
    fn send_agent_message<'a>(
        &'a self,
        content: &'a str,
        await_response: bool,
    ) -> HostFuture<'a, Value>;

    /// Evaluate a branch/loop condition against the runtime context.
    fn evaluate<'a>(&'a self, condition: &'a Value, context: &'a Value) -> HostFuture<'a, bool>;

    /// Resolve a referenced workflow id to its raw definition.
    fn resolve_workflow<'a>(&'a self, workflow_id: &'a str) -> HostFuture<'a, Value>;
}
