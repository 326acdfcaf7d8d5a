//! Errors from tool registration, execution, and rendezvous.

use engine_types::{Classify, ErrorCategory};
use thiserror::Error;

/// Errors raised by a [`crate::ToolRegistry`] or a [`crate::Tool`]'s
/// own execution.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ToolError {
    /// The requested tool was not found in the registry.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Tool execution failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The input provided to the tool was invalid.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A confirmation-required call was denied.
    #[error("tool call denied by confirmation")]
    Denied,

    /// A pending confirmation or client-tool result never arrived
    /// within its timeout.
    #[error("{0} timed out waiting for a result")]
    TimedOut(&'static str),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl Classify for ToolError {
    fn category(&self) -> ErrorCategory {
        match self {
            ToolError::TimedOut(_) => ErrorCategory::Timeout,
            ToolError::InvalidInput(_) => ErrorCategory::Validation,
            ToolError::NotFound(_) | ToolError::Denied => ErrorCategory::Application,
            ToolError::ExecutionFailed(_) | ToolError::Other(_) => ErrorCategory::Application,
        }
    }
}
