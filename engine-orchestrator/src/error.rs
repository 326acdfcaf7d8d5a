//! Errors raised by the tick orchestrator and execution graph.

use engine_types::{Classify, ErrorCategory};
use thiserror::Error;

/// Errors raised while driving a session's ticks or the execution
/// graph's fork/spawn/signal operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No model adapter was configured and no fallback getter resolved one.
    #[error("no model configured for this execution")]
    NoModelConfigured,

    /// The configured/resolved model adapter returned an error.
    #[error("model call failed: {0}")]
    Model(#[from] engine_model::ModelError),

    /// A render or hook-runtime error occurred during compile.
    #[error("compile failed: {0}")]
    Render(#[from] engine_fiber::RenderError),

    /// A tool call could not be completed.
    #[error("tool call failed: {0}")]
    Tool(#[from] engine_tool::ToolError),

    /// The COM rejected an operation.
    #[error("com error: {0}")]
    Com(#[from] engine_com::ComError),

    /// The execution was aborted.
    #[error("execution aborted: {0}")]
    Aborted(String),

    /// `signal`/`kill`/`requeue` referenced a pid not present in the graph.
    #[error("no execution handle for pid {0}")]
    UnknownPid(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl Classify for OrchestratorError {
    fn category(&self) -> ErrorCategory {
        match self {
            OrchestratorError::NoModelConfigured => ErrorCategory::Validation,
            OrchestratorError::Model(e) => e.category(),
            OrchestratorError::Render(_) => ErrorCategory::Application,
            OrchestratorError::Tool(e) => e.category(),
            OrchestratorError::Com(e) => e.category(),
            OrchestratorError::Aborted(_) => ErrorCategory::Abort,
            OrchestratorError::UnknownPid(_) => ErrorCategory::Validation,
            OrchestratorError::Other(_) => ErrorCategory::Unknown,
        }
    }
}
