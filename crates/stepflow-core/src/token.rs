//! Resume tokens.
//!
//! A token binds a suspension checkpoint to `(executionId, stepId,
//! workflowHash)`. It is a transparent claim set, not a secret: URL-safe
//! base64 over the canonical JSON of the claims, so the same checkpoint
//! always mints the same token and the harness can verify a resume call
//! against the paused state without any stored secret.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stepflow_types::error::EngineError;

use crate::canonical::canonical_string;

/// The claims carried by a resume token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub execution_id: String,
    pub step_id: String,
    pub workflow_hash: String,
}

/// Mint the token for a suspension checkpoint.
pub fn mint(execution_id: &str, step_id: &str, workflow_hash: &str) -> String {
    let claims = TokenClaims {
        execution_id: execution_id.to_string(),
        step_id: step_id.to_string(),
        workflow_hash: workflow_hash.to_string(),
    };
    let json = serde_json::to_value(&claims).unwrap_or(Value::Null);
    URL_SAFE_NO_PAD.encode(canonical_string(&json))
}

/// Decode a token back into its claims. `None` for anything that is not a
/// well-formed token.
pub fn decode(token: &str) -> Option<TokenClaims> {
    let bytes = URL_SAFE_NO_PAD.decode(token).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Verify a presented token against the paused checkpoint.
pub fn verify(
    token: &str,
    execution_id: &str,
    step_id: &str,
    workflow_hash: &str,
) -> Result<TokenClaims, EngineError> {
    let claims = decode(token).ok_or_else(|| EngineError::ResumeTokenMismatch {
        step_id: step_id.to_string(),
    })?;
    if claims.execution_id != execution_id
        || claims.step_id != step_id
        || claims.workflow_hash != workflow_hash
    {
        return Err(EngineError::ResumeTokenMismatch {
            step_id: claims.step_id,
        });
    }
    Ok(claims)
}
