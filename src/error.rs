//! Error types for the reconciliation and execution core.
//!
//! Most failure conditions are converted into [`ToolMessage`] outcomes so
//! that one failing call never prevents the rest of a batch from being
//! reconciled. Only two conditions cross the coordinator boundary as
//! errors: [`ToolWeaveError::Interrupted`] (always) and
//! [`ToolWeaveError::Invocation`] (when error suppression is disabled).
//!
//! [`ToolMessage`]: crate::types::ToolMessage

use thiserror::Error;

/// Errors produced by the tool-call core.
#[derive(Error, Debug)]
pub enum ToolWeaveError {
    /// Tool name could not be resolved in the active registry.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool-call arguments could not be decoded as JSON.
    #[error("Argument decode error for tool '{name}': {reason}")]
    ArgumentDecode { name: String, reason: String },

    /// A capability failed during invocation.
    #[error("Tool '{name}' failed: {reason}")]
    Invocation { name: String, reason: String },

    /// Cooperative cancellation was requested. Never converted into an
    /// error outcome; always propagates out of the batch.
    #[error("Execution interrupted")]
    Interrupted,

    /// The external error-reporting collaborator itself failed. Isolated
    /// at the call site; never surfaces to the caller of `run()`.
    #[error("Error callback failed: {0}")]
    Callback(String),

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolWeaveError {
    /// Whether this error must propagate regardless of the executor's
    /// suppression setting.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Result type for toolweave operations.
pub type Result<T> = std::result::Result<T, ToolWeaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_is_flagged() {
        assert!(ToolWeaveError::Interrupted.is_interrupt());
        assert!(
            !ToolWeaveError::Invocation {
                name: "search".into(),
                reason: "boom".into()
            }
            .is_interrupt()
        );
    }

    #[test]
    fn display_includes_tool_name() {
        let e = ToolWeaveError::ToolNotFound("lookup".into());
        assert_eq!(e.to_string(), "Tool not found: lookup");
    }
}
