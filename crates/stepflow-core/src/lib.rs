//! Workflow compiler and execution engine.
//!
//! The two halves of the Stepflow core:
//!
//! - [`compiler`] validates a raw JSON workflow definition, canonicalizes it
//!   into a content-addressed artifact, and resolves the deterministic step
//!   order.
//! - [`engine`] interprets a compiled workflow against runtime inputs as a
//!   resumable state machine: retries, nested control flow, parallel
//!   fan-out, sub-workflow calls, and approval-gated suspension.
//!
//! The engine reaches the outside world only through the [`host::StepHost`]
//! and [`events::EventSink`] trait seams; the live implementations live in
//! the CLI crate.

pub mod canonical;
pub mod compiler;
pub mod engine;
pub mod events;
pub mod host;
pub mod token;
