//! Shared domain types for Stepflow.
//!
//! This crate contains the core domain types used across the Stepflow
//! compiler and execution engine: the step model, compiled workflows,
//! execution runs, engine events, and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod error;
pub mod event;
pub mod run;
pub mod step;
pub mod workflow;
