//! The error taxonomy surfaced to callers.
//!
//! Error kinds are prefix-encoded in their display form so callers can
//! pattern-match programmatically without a separate error-code field
//! (`resume_token_mismatch:<stepId>`, `approval_denied`, ...). All messages
//! are plain strings suitable for direct display.

use thiserror::Error;

/// Errors surfaced across the compiler/engine/harness boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Structural validation of the workflow definition failed.
    #[error("workflow_compile_error: {0}")]
    Compile(String),

    /// The caller's expected hash does not match the compiled hash; the
    /// definition drifted since the execution was queued.
    #[error("workflow_hash_mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: String, computed: String },

    /// A resume call carried a token that does not match the currently
    /// paused checkpoint.
    #[error("resume_token_mismatch:{step_id}")]
    ResumeTokenMismatch { step_id: String },

    /// A step's underlying action failed and exhausted its retry budget.
    #[error("step_execution_error: step '{step_id}' failed: {error}")]
    StepExecution { step_id: String, error: String },

    /// The human reviewer denied the approval. Not a failure; the run is
    /// cancelled.
    #[error("approval_denied")]
    ApprovalDenied,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_mismatch_is_prefix_encoded_with_step_id() {
        let err = EngineError::ResumeTokenMismatch {
            step_id: "review".to_string(),
        };
        assert_eq!(err.to_string(), "resume_token_mismatch:review");
    }

    #[test]
    fn approval_denied_is_bare_kind() {
        assert_eq!(EngineError::ApprovalDenied.to_string(), "approval_denied");
    }

    #[test]
    fn step_execution_error_names_the_step() {
        let err = EngineError::StepExecution {
            step_id: "lint".to_string(),
            error: "exit status 1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("step_execution_error:"));
        assert!(msg.contains("lint"));
        assert!(msg.contains("exit status 1"));
    }
}
