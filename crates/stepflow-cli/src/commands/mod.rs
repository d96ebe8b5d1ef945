//! Subcommand handlers.
//!
//! Each handler returns the process exit code; the exit-code contract is
//! stable: 0 success or benign cancel, 10 invalid input or compile error,
//! 20 missing or inconsistent flags, 40 execution failure.

pub mod propose;
pub mod resume;
pub mod run;
pub mod validate;

use std::collections::BTreeMap;
use std::io::Read;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use stepflow_types::run::RuntimeState;

pub const EXIT_OK: i32 = 0;
pub const EXIT_INVALID_INPUT: i32 = 10;
pub const EXIT_USAGE: i32 = 20;
pub const EXIT_EXECUTION: i32 = 40;

/// The stdin payload for `run` and `resume --decision approve`.
#[derive(Debug, Deserialize)]
pub struct RunPayload {
    pub workflow: Option<Value>,
    #[serde(default)]
    pub trigger: Option<Value>,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub runtime: Option<RuntimeState>,
}

/// Read standard input to completion before any execution begins, so large
/// payloads never interleave with step execution.
pub fn read_stdin() -> anyhow::Result<String> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

/// Write the single result line to standard output.
pub fn print_result(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Report a flag usage error on standard error and return the usage code.
pub fn usage_error(message: &str) -> i32 {
    eprintln!(
        "{}",
        serde_json::json!({ "type": "error", "error": message })
    );
    EXIT_USAGE
}
