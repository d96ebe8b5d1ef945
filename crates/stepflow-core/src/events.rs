//! Event emission seam.
//!
//! The engine narrates its progress through an [`EventSink`]; the harness
//! plugs in a sink that writes NDJSON to standard error. Emission is
//! fire-and-forget: a sink must never fail the run.

use stepflow_types::event::EngineEvent;

/// Receives engine events as they happen.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &EngineEvent);
}

/// Discards every event. Useful for tests and embedded callers.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &EngineEvent) {}
}
