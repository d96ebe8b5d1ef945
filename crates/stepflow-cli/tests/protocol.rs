//! End-to-end tests of the `stepflow` binary: flag handling, exit codes,
//! the stdout result line, and the stderr event stream.

use std::io::Write;
use std::process::{Command, Stdio};

use serde_json::{json, Value};

fn invoke(args: &[&str], stdin: Option<&str>) -> (i32, String, String) {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_stepflow"));
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().expect("spawn stepflow");
    if let Some(input) = stdin {
        child
            .stdin
            .take()
            .expect("stdin handle")
            .write_all(input.as_bytes())
            .expect("write stdin");
    }
    let output = child.wait_with_output().expect("wait for stepflow");
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8(output.stdout).expect("utf8 stdout"),
        String::from_utf8(output.stderr).expect("utf8 stderr"),
    )
}

fn result_line(stdout: &str) -> Value {
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    assert_eq!(lines.len(), 1, "expected one result line, got: {stdout:?}");
    serde_json::from_str(lines[0]).expect("result line is JSON")
}

fn stderr_events(stderr: &str) -> Vec<Value> {
    stderr
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

/// Compile via `validate` to learn the hash the CLI will compute.
fn hash_of(workflow: &Value) -> String {
    let (code, stdout, _) = invoke(
        &["validate", "--workflow-json", &workflow.to_string()],
        None,
    );
    assert_eq!(code, 0);
    result_line(&stdout)["workflowHash"]
        .as_str()
        .expect("workflowHash")
        .to_string()
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

#[test]
fn validate_reports_hash_and_step_order() {
    let workflow = json!({
        "name": "ci",
        "steps": [
            {"id": "lint", "type": "bash", "command": "true"},
            {"id": "test", "type": "bash", "command": "true"}
        ]
    });
    let (code, stdout, _) = invoke(
        &["validate", "--workflow-json", &workflow.to_string()],
        None,
    );
    assert_eq!(code, 0);
    let result = result_line(&stdout);
    assert_eq!(result["ok"], true);
    assert_eq!(result["status"], "valid");
    assert!(result["workflowHash"]
        .as_str()
        .unwrap()
        .starts_with("sha256:"));
    assert_eq!(result["stepOrder"], json!(["lint", "test"]));
}

#[test]
fn validate_is_idempotent() {
    let workflow = json!({"steps": [{"id": "s", "type": "bash", "command": "true"}]});
    let first = hash_of(&workflow);
    let second = hash_of(&workflow);
    assert_eq!(first, second);
}

#[test]
fn validate_reads_stdin_when_json_is_dash() {
    let workflow = json!({"steps": [{"id": "s", "type": "bash", "command": "true"}]});
    let (code, stdout, _) = invoke(
        &["validate", "--workflow-json", "-"],
        Some(&workflow.to_string()),
    );
    assert_eq!(code, 0);
    assert_eq!(result_line(&stdout)["status"], "valid");
}

#[test]
fn validate_rejects_structural_errors_with_exit_10() {
    let workflow = json!({"steps": [{"id": "s", "type": "agent_message"}]});
    let (code, stdout, _) = invoke(
        &["validate", "--workflow-json", &workflow.to_string()],
        None,
    );
    assert_eq!(code, 10);
    let result = result_line(&stdout);
    assert_eq!(result["status"], "invalid");
    let errors = result["errors"].as_array().unwrap();
    assert!(errors
        .iter()
        .any(|e| e.as_str().unwrap().contains("agent_message step requires content")));
}

#[test]
fn validate_rejects_malformed_json_with_exit_10() {
    let (code, stdout, _) = invoke(&["validate", "--workflow-json", "{not json"], None);
    assert_eq!(code, 10);
    assert_eq!(result_line(&stdout)["ok"], false);
}

#[test]
fn validate_reads_workflow_from_a_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("wf.json");
    let workflow = json!({"steps": [{"id": "s", "type": "bash", "command": "true"}]});
    std::fs::write(&path, workflow.to_string()).expect("write workflow file");

    let (code, stdout, _) = invoke(&["validate", "--workflow-path", path.to_str().unwrap()], None);
    assert_eq!(code, 0);
    assert_eq!(result_line(&stdout)["status"], "valid");
}

#[test]
fn validate_unreadable_file_exits_10() {
    let (code, stdout, _) = invoke(
        &["validate", "--workflow-path", "/no/such/file.json"],
        None,
    );
    assert_eq!(code, 10);
    assert_eq!(result_line(&stdout)["ok"], false);
}

#[test]
fn validate_without_a_source_is_a_usage_error() {
    let (code, _, _) = invoke(&["validate"], None);
    assert_eq!(code, 20);
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[test]
fn run_executes_a_bash_workflow_end_to_end() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let workflow = json!({
        "steps": [{"id": "lint", "type": "bash", "command": "echo checked",
                   "outputVariable": "lintResult"}]
    });
    let hash = hash_of(&workflow);
    let payload = json!({ "workflow": workflow }).to_string();

    let (code, stdout, stderr) = invoke(
        &[
            "run",
            "--execution-id",
            "e1",
            "--workflow-hash",
            &hash,
            "--workspace",
            workspace.path().to_str().unwrap(),
        ],
        Some(&payload),
    );
    assert_eq!(code, 0, "stderr: {stderr}");
    let result = result_line(&stdout);
    assert_eq!(result["executionId"], "e1");
    assert_eq!(result["status"], "ok");
    assert_eq!(result["steps"][0]["stepId"], "lint");
    assert_eq!(result["steps"][0]["status"], "completed");
    assert_eq!(result["output"]["lintResult"]["stdout"], "checked");

    let events = stderr_events(&stderr);
    let types: Vec<&str> = events
        .iter()
        .filter_map(|e| e["type"].as_str())
        .collect();
    assert_eq!(types.first(), Some(&"execution.started"));
    assert_eq!(types.last(), Some(&"execution.finished"));
    assert!(types.contains(&"step.started"));
    assert!(types.contains(&"step.completed"));
}

#[test]
fn run_accepts_a_bare_hex_hash() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let workflow = json!({"steps": [{"id": "s", "type": "bash", "command": "true"}]});
    let bare = hash_of(&workflow)
        .strip_prefix("sha256:")
        .unwrap()
        .to_string();
    let payload = json!({ "workflow": workflow }).to_string();

    let (code, stdout, _) = invoke(
        &[
            "run",
            "--execution-id",
            "e1",
            "--workflow-hash",
            &bare,
            "--workspace",
            workspace.path().to_str().unwrap(),
        ],
        Some(&payload),
    );
    assert_eq!(code, 0);
    assert_eq!(result_line(&stdout)["status"], "ok");
}

#[test]
fn run_hash_mismatch_exits_20_without_executing() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let marker = workspace.path().join("ran");
    let workflow = json!({
        "steps": [{"id": "s", "type": "bash",
                   "command": format!("touch {}", marker.display())}]
    });
    let payload = json!({ "workflow": workflow }).to_string();

    let (code, stdout, _) = invoke(
        &[
            "run",
            "--execution-id",
            "e1",
            "--workflow-hash",
            "sha256:0000000000000000000000000000000000000000000000000000000000000000",
            "--workspace",
            workspace.path().to_str().unwrap(),
        ],
        Some(&payload),
    );
    assert_eq!(code, 20);
    let result = result_line(&stdout);
    assert_eq!(result["status"], "failed");
    assert!(result["error"]
        .as_str()
        .unwrap()
        .starts_with("workflow_hash_mismatch"));
    assert!(!marker.exists(), "engine must not run on hash mismatch");
}

#[test]
fn run_compile_error_exits_10_with_error_list() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let payload = json!({
        "workflow": {"steps": [{"id": "s", "type": "bash"}]}
    })
    .to_string();

    let (code, stdout, _) = invoke(
        &[
            "run",
            "--execution-id",
            "e1",
            "--workflow-hash",
            "sha256:irrelevant",
            "--workspace",
            workspace.path().to_str().unwrap(),
        ],
        Some(&payload),
    );
    assert_eq!(code, 10);
    let result = result_line(&stdout);
    assert!(result["error"]
        .as_str()
        .unwrap()
        .starts_with("workflow_compile_error"));
    assert!(result["errors"].as_array().unwrap().len() == 1);
}

#[test]
fn run_failing_step_exits_40() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let workflow = json!({"steps": [{"id": "s", "type": "bash", "command": "exit 7"}]});
    let hash = hash_of(&workflow);
    let payload = json!({ "workflow": workflow }).to_string();

    let (code, stdout, _) = invoke(
        &[
            "run",
            "--execution-id",
            "e1",
            "--workflow-hash",
            &hash,
            "--workspace",
            workspace.path().to_str().unwrap(),
        ],
        Some(&payload),
    );
    assert_eq!(code, 40);
    let result = result_line(&stdout);
    assert_eq!(result["status"], "failed");
    assert!(result["error"]
        .as_str()
        .unwrap()
        .starts_with("step_execution_error"));
}

#[test]
fn run_resolves_subworkflow_references_from_the_workspace() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let workflows_dir = workspace.path().join("workflows");
    std::fs::create_dir_all(&workflows_dir).expect("create workflows dir");
    let child = json!({
        "steps": [{"id": "inner", "type": "bash", "command": "echo from-child",
                   "outputVariable": "innerOut"}]
    });
    std::fs::write(workflows_dir.join("child.json"), child.to_string()).expect("write child");

    let workflow = json!({
        "steps": [{"id": "call", "type": "subworkflow", "workflowId": "child",
                   "outputVariable": "childResult"}]
    });
    let hash = hash_of(&workflow);
    let payload = json!({ "workflow": workflow }).to_string();

    let (code, stdout, stderr) = invoke(
        &[
            "run",
            "--execution-id",
            "e1",
            "--workflow-hash",
            &hash,
            "--workspace",
            workspace.path().to_str().unwrap(),
        ],
        Some(&payload),
    );
    assert_eq!(code, 0, "stderr: {stderr}");
    let result = result_line(&stdout);
    assert_eq!(result["status"], "ok");
    assert_eq!(
        result["output"]["childResult"]["innerOut"]["stdout"],
        "from-child"
    );
}

#[test]
fn run_without_required_flags_is_a_usage_error() {
    let (code, stdout, _) = invoke(&["run", "--execution-id", "e1"], None);
    assert_eq!(code, 20);
    assert!(stdout.trim().is_empty(), "no result line on usage errors");
}

#[test]
fn run_with_malformed_stdin_exits_10() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let (code, stdout, _) = invoke(
        &[
            "run",
            "--execution-id",
            "e1",
            "--workflow-hash",
            "sha256:abc",
            "--workspace",
            workspace.path().to_str().unwrap(),
        ],
        Some("{broken"),
    );
    assert_eq!(code, 10);
    assert_eq!(result_line(&stdout)["status"], "failed");
}

// ---------------------------------------------------------------------------
// resume
// ---------------------------------------------------------------------------

#[test]
fn resume_deny_short_circuits_without_workflow_content() {
    let (code, stdout, _) = invoke(
        &[
            "resume",
            "--execution-id",
            "e1",
            "--resume-token",
            "whatever",
            "--decision",
            "deny",
        ],
        None,
    );
    assert_eq!(code, 0);
    let result = result_line(&stdout);
    assert_eq!(result["status"], "cancelled");
    assert_eq!(result["error"], "approval_denied");
}

#[test]
fn resume_approve_without_hash_is_a_usage_error() {
    let (code, _, _) = invoke(
        &[
            "resume",
            "--execution-id",
            "e1",
            "--resume-token",
            "whatever",
        ],
        None,
    );
    assert_eq!(code, 20);
}

#[test]
fn approval_suspends_then_resumes_to_completion() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let workflow = json!({
        "steps": [
            {"id": "gather", "type": "bash", "command": "echo report",
             "outputVariable": "report"},
            {"id": "review", "type": "approval", "message": "publish?"},
            {"id": "publish", "type": "bash", "command": "echo published",
             "outputVariable": "published"}
        ]
    });
    let hash = hash_of(&workflow);
    let ws = workspace.path().to_str().unwrap();

    let payload = json!({ "workflow": &workflow }).to_string();
    let (code, stdout, _) = invoke(
        &[
            "run",
            "--execution-id",
            "e1",
            "--workflow-hash",
            &hash,
            "--workspace",
            ws,
        ],
        Some(&payload),
    );
    assert_eq!(code, 0, "suspension is not a failure");
    let suspended = result_line(&stdout);
    assert_eq!(suspended["status"], "needs_approval");
    assert_eq!(suspended["requiresApproval"]["stepId"], "review");
    assert_eq!(suspended["requiresApproval"]["prompt"], "publish?");
    let token = suspended["requiresApproval"]["resumeToken"]
        .as_str()
        .unwrap()
        .to_string();
    // The publish step has not run yet.
    assert!(suspended["output"].get("published").is_none());

    // The host persists the envelope and hands its state back on resume.
    let resume_payload = json!({
        "workflow": workflow,
        "runtime": {
            "pausedStepId": "review",
            "output": suspended["output"],
            "steps": suspended["steps"],
        }
    })
    .to_string();
    let (code, stdout, _) = invoke(
        &[
            "resume",
            "--execution-id",
            "e1",
            "--resume-token",
            &token,
            "--workflow-hash",
            &hash,
            "--workspace",
            ws,
        ],
        Some(&resume_payload),
    );
    assert_eq!(code, 0);
    let finished = result_line(&stdout);
    assert_eq!(finished["status"], "ok");
    assert_eq!(finished["output"]["report"]["stdout"], "report");
    assert_eq!(finished["output"]["published"]["stdout"], "published");
    let review = finished["steps"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["stepId"] == "review")
        .unwrap();
    assert_eq!(review["status"], "completed");
}

#[test]
fn resume_with_stale_token_exits_40() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let workflow = json!({
        "steps": [
            {"id": "review", "type": "approval", "message": "go?"},
            {"id": "after", "type": "bash", "command": "true"}
        ]
    });
    let hash = hash_of(&workflow);

    let resume_payload = json!({
        "workflow": workflow,
        "runtime": { "pausedStepId": "review", "output": {}, "steps": [] }
    })
    .to_string();
    let (code, stdout, _) = invoke(
        &[
            "resume",
            "--execution-id",
            "e1",
            "--resume-token",
            "bogus-token",
            "--workflow-hash",
            &hash,
            "--workspace",
            workspace.path().to_str().unwrap(),
        ],
        Some(&resume_payload),
    );
    assert_eq!(code, 40);
    let result = result_line(&stdout);
    assert_eq!(result["status"], "failed");
    assert!(result["error"]
        .as_str()
        .unwrap()
        .starts_with("resume_token_mismatch:"));
}

// ---------------------------------------------------------------------------
// propose
// ---------------------------------------------------------------------------

#[test]
fn propose_packages_the_intent_into_a_record() {
    let (code, stdout, stderr) = invoke(
        &[
            "propose",
            "--workflow-id",
            "daily-report",
            "--base-hash",
            "abc123",
            "--intent",
            "add a retry to the deploy step",
        ],
        None,
    );
    assert_eq!(code, 0);
    let result = result_line(&stdout);
    assert_eq!(result["workflowId"], "daily-report");
    assert_eq!(result["baseHash"], "sha256:abc123");
    assert_eq!(result["summary"], "add a retry to the deploy step");
    assert!(result["proposedWorkflow"].is_null());
    assert!(result["diff"].is_null());

    let events = stderr_events(&stderr);
    assert!(events.iter().any(|e| e["type"] == "proposal.created"));
}

#[test]
fn propose_without_intent_is_a_usage_error() {
    let (code, _, _) = invoke(
        &["propose", "--workflow-id", "wf", "--base-hash", "abc"],
        None,
    );
    assert_eq!(code, 20);
}
