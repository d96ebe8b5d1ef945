//! NDJSON event stream on standard error.
//!
//! Standard output is reserved for the single result line, so progress and
//! audit events go to stderr, one JSON object per line, where a supervising
//! process can tail them.

use std::io::Write;

use stepflow_core::events::EventSink;
use stepflow_types::event::EngineEvent;

pub struct StderrSink;

impl StderrSink {
    pub fn emit_event(event: &EngineEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let stderr = std::io::stderr();
            let mut handle = stderr.lock();
            // A broken stderr must not fail the run.
            let _ = writeln!(handle, "{line}");
        }
    }
}

impl EventSink for StderrSink {
    fn emit(&self, event: &EngineEvent) {
        Self::emit_event(event);
    }
}
