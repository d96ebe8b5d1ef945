//! The live step host: real side effects for engine actions.
//!
//! `bash` steps run through `sh -c` inside the workspace; `tool` and agent
//! steps return a delegation descriptor for the embedding orchestrator,
//! which owns the actual tool registry and LLM sessions. Conditions are
//! JEXL expressions evaluated against the run context.

use std::path::PathBuf;

use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use stepflow_core::host::{HostError, HostFuture, StepHost};

use crate::expression;

/// Host implementation backed by the workspace directory.
pub struct LiveHost {
    workspace: PathBuf,
}

impl LiveHost {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

impl StepHost for LiveHost {
    fn run_bash<'a>(&'a self, command: &'a str) -> HostFuture<'a, Value> {
        Box::pin(async move {
            debug!(command, "running bash step");
            let output = Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&self.workspace)
                .output()
                .await
                .map_err(|e| HostError::Action(format!("failed to spawn shell: {e}")))?;

            let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
            if !output.status.success() {
                let code = output.status.code().unwrap_or(-1);
                let detail = if stderr.is_empty() { stdout } else { stderr };
                return Err(HostError::Action(format!("exit status {code}: {detail}")));
            }
            Ok(json!({ "stdout": stdout, "stderr": stderr, "exitCode": 0 }))
        })
    }

    fn run_tool<'a>(&'a self, tool: &'a str, input: Option<&'a Value>) -> HostFuture<'a, Value> {
        Box::pin(async move {
            // Tool execution belongs to the orchestrator; the engine records
            // the delegation so the step has a concrete, auditable output.
            Ok(json!({
                "delegated": true,
                "tool": tool,
                "input": input.cloned().unwrap_or(Value::Null),
            }))
        })
    }

    fn send_agent<'a>(&'a self, goal: &'a str) -> HostFuture<'a, Value> {
        Box::pin(async move {
            Ok(json!({ "delegated": true, "agent": "orchestrator", "goal": goal }))
        })
    }

    fn send_agent_message<'a>(
        &'a self,
        content: &'a str,
        await_response: bool,
    ) -> HostFuture<'a, Value> {
        Box::pin(async move {
            Ok(json!({
                "delegated": true,
                "content": content,
                "awaitResponse": await_response,
            }))
        })
    }

    fn evaluate<'a>(&'a self, condition: &'a Value, context: &'a Value) -> HostFuture<'a, bool> {
        // The JEXL evaluator is not Send, so evaluation happens in a sync
        // helper before the future would ever be polled across threads.
        Box::pin(async move {
            expression::evaluate_condition(condition, context).map_err(HostError::Action)
        })
    }

    fn resolve_workflow<'a>(&'a self, workflow_id: &'a str) -> HostFuture<'a, Value> {
        Box::pin(async move {
            let path = self
                .workspace
                .join("workflows")
                .join(format!("{workflow_id}.json"));
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|_| HostError::NotFound(format!("workflow {workflow_id}")))?;
            serde_json::from_str(&raw)
                .map_err(|e| HostError::Action(format!("workflow {workflow_id} is not valid JSON: {e}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bash_step_captures_stdout() {
        let dir = std::env::temp_dir();
        let host = LiveHost::new(dir);
        let out = host.run_bash("echo hello").await.unwrap();
        assert_eq!(out["stdout"], "hello");
        assert_eq!(out["exitCode"], 0);
    }

    #[tokio::test]
    async fn failing_bash_step_reports_exit_status() {
        let host = LiveHost::new(std::env::temp_dir());
        let err = host.run_bash("echo nope >&2; exit 3").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit status 3"), "{msg}");
        assert!(msg.contains("nope"), "{msg}");
    }

    #[tokio::test]
    async fn tool_step_returns_delegation_descriptor() {
        let host = LiveHost::new(std::env::temp_dir());
        let input = json!({"query": "rust"});
        let out = host.run_tool("web_search", Some(&input)).await.unwrap();
        assert_eq!(out["delegated"], true);
        assert_eq!(out["tool"], "web_search");
        assert_eq!(out["input"]["query"], "rust");
    }

    #[tokio::test]
    async fn missing_workflow_reference_is_not_found() {
        let host = LiveHost::new(std::env::temp_dir());
        let err = host.resolve_workflow("no-such-workflow").await.unwrap_err();
        assert!(matches!(err, HostError::NotFound(_)));
    }
}
