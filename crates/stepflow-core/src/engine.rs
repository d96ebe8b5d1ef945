//! The execution engine.
//!
//! One [`Engine`] interprets a [`CompiledWorkflow`] against runtime inputs
//! as a resumable state machine. The process is short-lived: a run either
//! finishes in this invocation or suspends at an approval checkpoint, and
//! the embedding host persists the returned state and calls [`Engine::resume`]
//! in a later invocation.
//!
//! Composite steps record their own result after their children, so a run
//! suspended inside a branch can be re-entered: on resume, replayed results
//! mark their steps as done and the walk skips straight to the checkpoint.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use stepflow_types::error::EngineError;
use stepflow_types::event::EngineEvent;
use stepflow_types::run::{
    ApprovalRequest, ExecutionRun, RunStatus, RuntimeState, StepResult, StepStatus,
};
use stepflow_types::step::{collect_step_ids, Step, StepKind};
use stepflow_types::workflow::CompiledWorkflow;

use crate::compiler;
use crate::events::EventSink;
use crate::host::{HostError, StepHost};
use crate::token;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Runtime inputs for one `run` or `resume` invocation.
pub struct RunInput {
    /// Caller-supplied opaque execution id.
    pub execution_id: String,
    /// The triggering event payload, exposed to condition evaluation.
    pub trigger: Option<Value>,
    /// Caller-supplied variable bindings.
    pub variables: BTreeMap<String, Value>,
    /// Persisted state of a suspended run; required for resume.
    pub runtime: Option<RuntimeState>,
}

impl RunInput {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            trigger: None,
            variables: BTreeMap::new(),
            runtime: None,
        }
    }
}

/// A terminal `failed` envelope, used when a run cannot start at all.
pub fn failed_run(execution_id: &str, error: String) -> ExecutionRun {
    ExecutionRun {
        execution_id: execution_id.to_string(),
        status: RunStatus::Failed,
        output: BTreeMap::new(),
        steps: Vec::new(),
        requires_approval: None,
        error: Some(error),
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The workflow interpreter. Cheap to clone; parallel branches each get a
/// clone driving a forked run state.
#[derive(Clone)]
pub struct Engine {
    host: Arc<dyn StepHost>,
    events: Arc<dyn EventSink>,
}

/// Control flow after a step: keep going, suspend the run, or fail it.
enum StepFlow {
    Continue,
    Suspend(ApprovalRequest),
    Fail { error: String },
}

impl Engine {
    pub fn new(host: Arc<dyn StepHost>, events: Arc<dyn EventSink>) -> Self {
        Self { host, events }
    }

    /// Execute a compiled workflow from the top.
    pub async fn run(&self, workflow: &CompiledWorkflow, input: RunInput) -> ExecutionRun {
        let mut state = RunState::fresh(workflow, input);
        self.drive(workflow, &mut state).await
    }

    /// Resume a suspended run at its approval checkpoint.
    ///
    /// The token must match the paused step recorded in the runtime state;
    /// a stale or wrong-checkpoint token yields a `failed` envelope without
    /// executing anything.
    pub async fn resume(
        &self,
        workflow: &CompiledWorkflow,
        mut input: RunInput,
        resume_token: &str,
    ) -> ExecutionRun {
        let runtime = input.runtime.take().unwrap_or_default();
        let Some(paused_step_id) = runtime.paused_step_id.clone() else {
            let step_id = token::decode(resume_token)
                .map(|c| c.step_id)
                .unwrap_or_else(|| "unknown".to_string());
            return failed_run(
                &input.execution_id,
                EngineError::ResumeTokenMismatch { step_id }.to_string(),
            );
        };

        if let Err(err) = token::verify(
            resume_token,
            &input.execution_id,
            &paused_step_id,
            &workflow.workflow_hash,
        ) {
            return failed_run(&input.execution_id, err.to_string());
        }

        let mut state = RunState::resumed(workflow, input, runtime, paused_step_id);
        self.drive(workflow, &mut state).await
    }

    async fn drive(&self, workflow: &CompiledWorkflow, state: &mut RunState) -> ExecutionRun {
        self.events.emit(&EngineEvent::ExecutionStarted {
            execution_id: state.execution_id.clone(),
            workflow_hash: workflow.workflow_hash.clone(),
            ts: Utc::now(),
        });

        let flow = self.execute_steps(state, &workflow.steps, 1).await;
        let run = state.finish(flow);

        self.events.emit(&EngineEvent::ExecutionFinished {
            execution_id: run.execution_id.clone(),
            status: run.status,
            ts: Utc::now(),
        });
        run
    }

    // -----------------------------------------------------------------------
    // Step walk
    // -----------------------------------------------------------------------

    /// Execute a step sequence in order, stopping at the first suspension or
    /// failure. Boxed for recursion into nested bodies.
    fn execute_steps<'a>(
        &'a self,
        state: &'a mut RunState,
        steps: &'a [Step],
        attempt: u32,
    ) -> Pin<Box<dyn Future<Output = StepFlow> + Send + 'a>> {
        Box::pin(async move {
            for step in steps {
                match self.execute_step(state, step, attempt).await {
                    StepFlow::Continue => {}
                    other => return other,
                }
            }
            StepFlow::Continue
        })
    }

    async fn execute_step(&self, state: &mut RunState, step: &Step, attempt: u32) -> StepFlow {
        // Resume replay: work recorded before the pause is not re-executed.
        if state.resuming && attempt == 1 && state.completed.contains(&step.id) {
            debug!(step_id = %step.id, "skipping replayed step");
            return StepFlow::Continue;
        }

        match &step.kind {
            StepKind::Agent { .. }
            | StepKind::AgentMessage { .. }
            | StepKind::Tool { .. }
            | StepKind::Bash { .. } => self.run_action(state, step, attempt).await,
            StepKind::Conditional {
                condition,
                then_steps,
                else_steps,
            } => {
                self.run_conditional(state, step, condition, then_steps, else_steps, attempt)
                    .await
            }
            StepKind::Loop {
                condition,
                max_iterations,
                steps,
            } => {
                self.run_loop(state, step, condition.as_ref(), *max_iterations, steps)
                    .await
            }
            StepKind::Parallel { steps } => self.run_parallel(state, step, steps, attempt).await,
            StepKind::Subworkflow {
                workflow_id,
                definition,
                ..
            } => {
                self.run_subworkflow(state, step, workflow_id.as_deref(), definition.as_ref())
                    .await
            }
            StepKind::Approval {
                message,
                timeout_at,
                default_action,
                items,
            } => self.run_approval(state, step, message, timeout_at, default_action, items),
        }
    }

    // -----------------------------------------------------------------------
    // Action steps
    // -----------------------------------------------------------------------

    /// Run an external action with the step's retry budget. One result is
    /// recorded per step; the recorded attempt counts retries on top of the
    /// enclosing loop iteration, so iteration 3 with one retry reports 4.
    async fn run_action(&self, state: &mut RunState, step: &Step, attempt: u32) -> StepFlow {
        let max_attempts = step.retry.as_ref().map(|r| r.max_attempts).unwrap_or(1).max(1);

        for try_n in 1..=max_attempts {
            let label = attempt + try_n - 1;
            let started_at = Utc::now();
            self.events.emit(&EngineEvent::StepStarted {
                execution_id: state.execution_id.clone(),
                step_id: step.id.clone(),
                step_type: step.kind_name().to_string(),
                attempt: label,
                ts: started_at,
            });

            match self.dispatch_action(step).await {
                Ok(output) => {
                    let mut result = StepResult::new(&step.id, StepStatus::Completed, label);
                    result.started_at = Some(started_at);
                    result.completed_at = Some(Utc::now());
                    result.output = Some(output.clone());
                    state.record_completed(step, result, output);
                    self.events.emit(&EngineEvent::StepCompleted {
                        execution_id: state.execution_id.clone(),
                        step_id: step.id.clone(),
                        status: StepStatus::Completed,
                        ts: Utc::now(),
                    });
                    return StepFlow::Continue;
                }
                Err(err) if try_n < max_attempts => {
                    warn!(step_id = %step.id, attempt = try_n, error = %err, "step attempt failed, retrying");
                }
                Err(err) => {
                    let error = EngineError::StepExecution {
                        step_id: step.id.clone(),
                        error: err.to_string(),
                    }
                    .to_string();
                    let mut result = StepResult::new(&step.id, StepStatus::Failed, label);
                    result.started_at = Some(started_at);
                    result.completed_at = Some(Utc::now());
                    result.error = Some(error.clone());
                    state.results.push(result);
                    self.events.emit(&EngineEvent::StepFailed {
                        execution_id: state.execution_id.clone(),
                        step_id: step.id.clone(),
                        error: error.clone(),
                        ts: Utc::now(),
                    });
                    return StepFlow::Fail { error };
                }
            }
        }
        StepFlow::Continue
    }

    async fn dispatch_action(&self, step: &Step) -> Result<Value, HostError> {
        match &step.kind {
            StepKind::Bash { command } => self.host.run_bash(command).await,
            StepKind::Tool { tool, input } => self.host.run_tool(tool, input.as_ref()).await,
            StepKind::Agent { goal } => self.host.send_agent(goal).await,
            StepKind::AgentMessage {
                content,
                await_response,
                await_timeout_ms,
            } => {
                let fut = self.host.send_agent_message(content, *await_response);
                match (await_response, await_timeout_ms) {
                    (true, Some(ms)) => match tokio::time::timeout(Duration::from_millis(*ms), fut)
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(HostError::Timeout(*ms)),
                    },
                    _ => fut.await,
                }
            }
            _ => Err(HostError::Action(format!(
                "step '{}' is not an action step",
                step.id
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Conditional
    // -----------------------------------------------------------------------

    async fn run_conditional(
        &self,
        state: &mut RunState,
        step: &Step,
        condition: &Value,
        then_steps: &[Step],
        else_steps: &[Step],
        attempt: u32,
    ) -> StepFlow {
        let started_at = Utc::now();
        self.emit_started(state, step, attempt);
        let context = state.context_value();
        let taken = match self.host.evaluate(condition, &context).await {
            Ok(v) => v,
            Err(err) => return self.fail_step(state, step, started_at, attempt, err.to_string()),
        };

        // Untaken-branch ids are marked skipped so audit trails account for
        // every id in the step order.
        let untaken = if taken { else_steps } else { then_steps };
        let mut skipped_ids = Vec::new();
        collect_step_ids(untaken, &mut skipped_ids);
        for id in skipped_ids {
            if state.completed.insert(id.clone()) {
                state.results.push(StepResult::skipped(id));
            }
        }

        let branch = if taken { then_steps } else { else_steps };
        match self.execute_steps(state, branch, attempt).await {
            StepFlow::Continue => {}
            other => return other,
        }

        let mut result = StepResult::new(&step.id, StepStatus::Completed, attempt);
        result.started_at = Some(started_at);
        result.completed_at = Some(Utc::now());
        result.output = Some(json!({ "condition": taken }));
        let output = json!({ "condition": taken });
        state.record_completed(step, result, output);
        self.emit_completed(state, step, StepStatus::Completed);
        StepFlow::Continue
    }

    // -----------------------------------------------------------------------
    // Loop
    // -----------------------------------------------------------------------

    /// Run the body until the condition is false or the iteration bound is
    /// hit. Without a condition the bound alone drives the loop; without
    /// either, the body runs once.
    async fn run_loop(
        &self,
        state: &mut RunState,
        step: &Step,
        condition: Option<&Value>,
        max_iterations: Option<u32>,
        body: &[Step],
    ) -> StepFlow {
        const DEFAULT_BOUND: u32 = 100;
        let started_at = Utc::now();
        self.emit_started(state, step, 1);
        let bound = max_iterations.unwrap_or(if condition.is_some() {
            DEFAULT_BOUND
        } else {
            1
        });

        let mut iterations = 0u32;
        let mut condition_exhausted = condition.is_none();
        for i in 1..=bound {
            if let Some(cond) = condition {
                let context = state.context_value();
                match self.host.evaluate(cond, &context).await {
                    Ok(true) => {}
                    Ok(false) => {
                        condition_exhausted = true;
                        break;
                    }
                    Err(err) => {
                        return self.fail_step(state, step, started_at, 1, err.to_string())
                    }
                }
            }
            iterations = i;
            match self.execute_steps(state, body, i).await {
                StepFlow::Continue => {}
                other => return other,
            }
        }

        let output = json!({ "iterations": iterations, "completed": condition_exhausted });
        let mut result = StepResult::new(&step.id, StepStatus::Completed, 1);
        result.started_at = Some(started_at);
        result.completed_at = Some(Utc::now());
        result.output = Some(output.clone());
        state.record_completed(step, result, output);
        self.emit_completed(state, step, StepStatus::Completed);
        StepFlow::Continue
    }

    // -----------------------------------------------------------------------
    // Parallel
    // -----------------------------------------------------------------------

    /// Run child steps concurrently, then merge their results back into the
    /// parent state in document order so the outcome is deterministic
    /// regardless of completion order. A suspended child takes precedence
    /// over a failed one; otherwise the first failure in document order
    /// fails the group.
    async fn run_parallel(
        &self,
        state: &mut RunState,
        step: &Step,
        children: &[Step],
        attempt: u32,
    ) -> StepFlow {
        let started_at = Utc::now();
        self.emit_started(state, step, attempt);
        let mut set = JoinSet::new();
        for (index, child) in children.iter().cloned().enumerate() {
            let engine = self.clone();
            let mut fork = state.fork();
            set.spawn(async move {
                let branch = [child];
                let flow = engine.execute_steps(&mut fork, &branch, attempt).await;
                (index, flow, fork)
            });
        }

        let mut branches: Vec<(usize, StepFlow, RunState)> = Vec::with_capacity(children.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(branch) => branches.push(branch),
                Err(err) => {
                    return self.fail_step(
                        state,
                        step,
                        started_at,
                        attempt,
                        format!("parallel branch panicked: {err}"),
                    );
                }
            }
        }
        branches.sort_by_key(|(index, _, _)| *index);

        let mut group_flow = StepFlow::Continue;
        for (_, flow, fork) in branches {
            state.merge_fork(fork);
            match flow {
                // A suspended branch wins the group outcome, even over an
                // earlier failure; among failures the first in document
                // order wins.
                StepFlow::Suspend(request) => {
                    if !matches!(group_flow, StepFlow::Suspend(_)) {
                        group_flow = StepFlow::Suspend(request);
                    }
                }
                StepFlow::Fail { error } => {
                    if matches!(group_flow, StepFlow::Continue) {
                        group_flow = StepFlow::Fail { error };
                    }
                }
                StepFlow::Continue => {}
            }
        }

        match group_flow {
            StepFlow::Continue => {
                let output = json!({ "branches": children.len() });
                let mut result = StepResult::new(&step.id, StepStatus::Completed, attempt);
                result.started_at = Some(started_at);
                result.completed_at = Some(Utc::now());
                result.output = Some(output.clone());
                state.record_completed(step, result, output);
                self.emit_completed(state, step, StepStatus::Completed);
                StepFlow::Continue
            }
            StepFlow::Fail { error } => self.fail_step(state, step, started_at, attempt, error),
            suspend => suspend,
        }
    }

    // -----------------------------------------------------------------------
    // Subworkflow
    // -----------------------------------------------------------------------

    async fn run_subworkflow(
        &self,
        state: &mut RunState,
        step: &Step,
        workflow_id: Option<&str>,
        definition: Option<&Value>,
    ) -> StepFlow {
        let started_at = Utc::now();
        self.emit_started(state, step, 1);
        let raw = match (definition, workflow_id) {
            (Some(def), _) => def.clone(),
            (None, Some(id)) => match self.host.resolve_workflow(id).await {
                Ok(raw) => raw,
                Err(err) => {
                    return self.fail_step(state, step, started_at, 1, err.to_string());
                }
            },
            (None, None) => {
                return self.fail_step(
                    state,
                    step,
                    started_at,
                    1,
                    "subworkflow step has no workflow".to_string(),
                );
            }
        };

        let outcome = compiler::compile(&raw);
        let Some(child_workflow) = outcome.workflow else {
            let error = EngineError::Compile(outcome.error_strings().join("; ")).to_string();
            return self.fail_step(state, step, started_at, 1, error);
        };

        let mut child_input = RunInput::new(format!("{}:{}", state.execution_id, step.id));
        child_input.trigger = Some(state.trigger.clone());
        child_input.variables = state.variables.clone();

        // When the resume checkpoint lives inside this child, re-enter the
        // child at the checkpoint with its replayed results instead of
        // re-executing its pre-pause steps.
        let checkpoint = state.approved_step.as_deref().filter(|id| {
            state.resuming && child_workflow.step_order.iter().any(|s| s == id)
        });
        let child_run = match checkpoint {
            Some(approved) => {
                let approved = approved.to_string();
                let child_ids: HashSet<&str> =
                    child_workflow.step_order.iter().map(String::as_str).collect();
                // Hand the replayed child rows over to the child run; they
                // come back in its result set. The stale waiting record for
                // this step is replaced below.
                let mut replayed = Vec::new();
                state.results.retain(|r| {
                    if child_ids.contains(r.step_id.as_str()) {
                        replayed.push(r.clone());
                        false
                    } else {
                        !(r.step_id == step.id && r.status == StepStatus::WaitingApproval)
                    }
                });
                let runtime = RuntimeState {
                    paused_step_id: Some(approved.clone()),
                    output: rebuild_output_bindings(&child_workflow.steps, &replayed),
                    steps: replayed,
                };
                let mut child_state =
                    RunState::resumed(&child_workflow, child_input, runtime, approved);
                let run = self.drive(&child_workflow, &mut child_state).await;
                // The checkpoint is consumed inside the child.
                state.resuming = false;
                state.approved_step = None;
                run
            }
            None => self.run(&child_workflow, child_input).await,
        };

        state.results.extend(child_run.steps);

        match child_run.status {
            RunStatus::Ok => {
                let child_output = Value::Object(child_run.output.into_iter().collect());
                let mut result = StepResult::new(&step.id, StepStatus::Completed, 1);
                result.started_at = Some(started_at);
                result.completed_at = Some(Utc::now());
                result.output = Some(child_output.clone());
                // The child's output mapping only reaches the parent's
                // namespace through an explicit outputVariable binding.
                if step.output_variable.is_some() {
                    state.record_completed(step, result, child_output);
                } else {
                    state.completed.insert(step.id.clone());
                    state.step_outputs.insert(step.id.clone(), child_output);
                    state.results.push(result);
                }
                self.emit_completed(state, step, StepStatus::Completed);
                StepFlow::Continue
            }
            RunStatus::NeedsApproval => {
                let mut result = StepResult::new(&step.id, StepStatus::WaitingApproval, 1);
                result.started_at = Some(started_at);
                state.results.push(result);
                self.emit_completed(state, step, StepStatus::WaitingApproval);
                match child_run.requires_approval {
                    Some(mut request) => {
                        // Re-bind the token at the boundary: the harness
                        // resumes with the root execution id and root hash,
                        // not the child's.
                        request.resume_token = token::mint(
                            &state.execution_id,
                            &request.step_id,
                            &state.workflow_hash,
                        );
                        StepFlow::Suspend(request)
                    }
                    None => StepFlow::Fail {
                        error: EngineError::StepExecution {
                            step_id: step.id.clone(),
                            error: "child suspended without an approval request".to_string(),
                        }
                        .to_string(),
                    },
                }
            }
            RunStatus::Failed | RunStatus::Cancelled => {
                let error = child_run
                    .error
                    .unwrap_or_else(|| "subworkflow failed".to_string());
                self.fail_step(state, step, started_at, 1, error)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Approval
    // -----------------------------------------------------------------------

    fn run_approval(
        &self,
        state: &mut RunState,
        step: &Step,
        message: &str,
        timeout_at: &Option<String>,
        default_action: &Option<String>,
        items: &[Value],
    ) -> StepFlow {
        // Resume target: convert the replayed waiting_approval record into a
        // completed one and continue past the checkpoint.
        if state.resuming && state.approved_step.as_deref() == Some(step.id.as_str()) {
            let approved = json!({ "approved": true });
            match state
                .results
                .iter_mut()
                .find(|r| r.step_id == step.id && r.status == StepStatus::WaitingApproval)
            {
                Some(result) => {
                    result.status = StepStatus::Completed;
                    result.completed_at = Some(Utc::now());
                    result.output = Some(approved.clone());
                }
                None => {
                    let mut result = StepResult::new(&step.id, StepStatus::Completed, 1);
                    result.completed_at = Some(Utc::now());
                    result.output = Some(approved.clone());
                    state.results.push(result);
                }
            }
            state.completed.insert(step.id.clone());
            state.step_outputs.insert(step.id.clone(), approved.clone());
            if let Some(var) = &step.output_variable {
                state.output.insert(var.clone(), approved);
            }
            state.resuming = false;
            state.approved_step = None;
            self.events.emit(&EngineEvent::StepCompleted {
                execution_id: state.execution_id.clone(),
                step_id: step.id.clone(),
                status: StepStatus::Completed,
                ts: Utc::now(),
            });
            return StepFlow::Continue;
        }

        self.emit_started(state, step, 1);
        let resume_token = token::mint(&state.execution_id, &step.id, &state.workflow_hash);
        let mut checkpoint = serde_json::Map::new();
        if let Some(at) = timeout_at {
            checkpoint.insert("timeoutAt".to_string(), json!(at));
        }
        if let Some(action) = default_action {
            checkpoint.insert("defaultAction".to_string(), json!(action));
        }

        let mut result = StepResult::new(&step.id, StepStatus::WaitingApproval, 1);
        result.started_at = Some(Utc::now());
        if !checkpoint.is_empty() {
            result.output = Some(Value::Object(checkpoint));
        }
        state.results.push(result);
        self.events.emit(&EngineEvent::StepCompleted {
            execution_id: state.execution_id.clone(),
            step_id: step.id.clone(),
            status: StepStatus::WaitingApproval,
            ts: Utc::now(),
        });

        StepFlow::Suspend(ApprovalRequest {
            step_id: step.id.clone(),
            prompt: message.to_string(),
            items: items.to_vec(),
            resume_token,
        })
    }

    // -----------------------------------------------------------------------
    // Shared event emission and failure recording
    // -----------------------------------------------------------------------

    fn emit_started(&self, state: &RunState, step: &Step, attempt: u32) {
        self.events.emit(&EngineEvent::StepStarted {
            execution_id: state.execution_id.clone(),
            step_id: step.id.clone(),
            step_type: step.kind_name().to_string(),
            attempt,
            ts: Utc::now(),
        });
    }

    fn emit_completed(&self, state: &RunState, step: &Step, status: StepStatus) {
        self.events.emit(&EngineEvent::StepCompleted {
            execution_id: state.execution_id.clone(),
            step_id: step.id.clone(),
            status,
            ts: Utc::now(),
        });
    }

    fn fail_step(
        &self,
        state: &mut RunState,
        step: &Step,
        started_at: chrono::DateTime<Utc>,
        attempt: u32,
        error: String,
    ) -> StepFlow {
        let error = if error.starts_with("step_execution_error")
            || error.starts_with("workflow_compile_error")
        {
            error
        } else {
            EngineError::StepExecution {
                step_id: step.id.clone(),
                error,
            }
            .to_string()
        };
        let mut result = StepResult::new(&step.id, StepStatus::Failed, attempt);
        result.started_at = Some(started_at);
        result.completed_at = Some(Utc::now());
        result.error = Some(error.clone());
        state.results.push(result);
        self.events.emit(&EngineEvent::StepFailed {
            execution_id: state.execution_id.clone(),
            step_id: step.id.clone(),
            error: error.clone(),
            ts: Utc::now(),
        });
        StepFlow::Fail { error }
    }
}

/// Rebuild a child run's `outputVariable` namespace from its replayed
/// results, walking the step tree the same way the step order does.
fn rebuild_output_bindings(steps: &[Step], results: &[StepResult]) -> BTreeMap<String, Value> {
    let mut output = BTreeMap::new();
    collect_bindings(steps, results, &mut output);
    output
}

fn collect_bindings(
    steps: &[Step],
    results: &[StepResult],
    output: &mut BTreeMap<String, Value>,
) {
    for step in steps {
        if let Some(var) = &step.output_variable {
            let completed = results
                .iter()
                .find(|r| r.step_id == step.id && r.status == StepStatus::Completed);
            if let Some(value) = completed.and_then(|r| r.output.as_ref()) {
                output.insert(var.clone(), value.clone());
            }
        }
        match &step.kind {
            StepKind::Conditional {
                then_steps,
                else_steps,
                ..
            } => {
                collect_bindings(then_steps, results, output);
                collect_bindings(else_steps, results, output);
            }
            StepKind::Loop { steps, .. }
            | StepKind::Parallel { steps }
            | StepKind::Subworkflow { steps, .. } => {
                collect_bindings(steps, results, output);
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Mutable state threaded through one execution.
struct RunState {
    execution_id: String,
    workflow_hash: String,
    /// Variable bindings keyed by `outputVariable`.
    output: BTreeMap<String, Value>,
    /// Step outputs keyed by step id, for condition contexts.
    step_outputs: BTreeMap<String, Value>,
    results: Vec<StepResult>,
    variables: BTreeMap<String, Value>,
    trigger: Value,
    /// Ids already accounted for (completed or skipped).
    completed: HashSet<String>,
    /// True while replaying pre-pause work during a resume.
    resuming: bool,
    /// The approval step the resume is targeting.
    approved_step: Option<String>,
}

impl RunState {
    fn fresh(workflow: &CompiledWorkflow, input: RunInput) -> Self {
        Self {
            execution_id: input.execution_id,
            workflow_hash: workflow.workflow_hash.clone(),
            output: BTreeMap::new(),
            step_outputs: BTreeMap::new(),
            results: Vec::new(),
            variables: input.variables,
            trigger: input.trigger.unwrap_or(Value::Null),
            completed: HashSet::new(),
            resuming: false,
            approved_step: None,
        }
    }

    fn resumed(
        workflow: &CompiledWorkflow,
        input: RunInput,
        runtime: RuntimeState,
        paused_step_id: String,
    ) -> Self {
        let mut completed = HashSet::new();
        let mut step_outputs = BTreeMap::new();
        for result in &runtime.steps {
            if matches!(result.status, StepStatus::Completed | StepStatus::Skipped) {
                completed.insert(result.step_id.clone());
            }
            if let Some(output) = &result.output {
                step_outputs.insert(result.step_id.clone(), output.clone());
            }
        }
        Self {
            execution_id: input.execution_id,
            workflow_hash: workflow.workflow_hash.clone(),
            output: runtime.output,
            step_outputs,
            results: runtime.steps,
            variables: input.variables,
            trigger: input.trigger.unwrap_or(Value::Null),
            completed,
            resuming: true,
            approved_step: Some(paused_step_id),
        }
    }

    /// Record a completed step: result row, bookkeeping, and the
    /// `outputVariable` binding when declared.
    fn record_completed(&mut self, step: &Step, result: StepResult, output: Value) {
        self.completed.insert(step.id.clone());
        self.step_outputs.insert(step.id.clone(), output.clone());
        if let Some(var) = &step.output_variable {
            self.output.insert(var.clone(), output);
        }
        self.results.push(result);
    }

    /// The context object handed to condition evaluation.
    fn context_value(&self) -> Value {
        json!({
            "steps": self.step_outputs,
            "output": self.output,
            "variables": self.variables,
            "trigger": self.trigger,
        })
    }

    /// Snapshot for a parallel branch: shared context, empty result log.
    fn fork(&self) -> Self {
        Self {
            execution_id: self.execution_id.clone(),
            workflow_hash: self.workflow_hash.clone(),
            output: self.output.clone(),
            step_outputs: self.step_outputs.clone(),
            results: Vec::new(),
            variables: self.variables.clone(),
            trigger: self.trigger.clone(),
            completed: self.completed.clone(),
            resuming: self.resuming,
            approved_step: self.approved_step.clone(),
        }
    }

    /// Fold a finished parallel branch back into the parent.
    fn merge_fork(&mut self, fork: RunState) {
        for result in fork.results {
            self.results.push(result);
        }
        for (key, value) in fork.output {
            self.output.insert(key, value);
        }
        for (key, value) in fork.step_outputs {
            self.step_outputs.insert(key, value);
        }
        self.completed.extend(fork.completed);
        // A branch that passed its approval checkpoint ends the replay for
        // the whole run.
        if !fork.resuming {
            self.resuming = false;
            self.approved_step = None;
        }
    }

    fn finish(&mut self, flow: StepFlow) -> ExecutionRun {
        let (status, requires_approval, error) = match flow {
            StepFlow::Continue => (RunStatus::Ok, None, None),
            StepFlow::Suspend(request) => (RunStatus::NeedsApproval, Some(request), None),
            StepFlow::Fail { error } => (RunStatus::Failed, None, Some(error)),
        };
        ExecutionRun {
            execution_id: self.execution_id.clone(),
            status,
            output: std::mem::take(&mut self.output),
            steps: std::mem::take(&mut self.results),
            requires_approval,
            error,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
