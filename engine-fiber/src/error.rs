//! Errors from rendering, committing, and the hook runtime.

use engine_types::{Classify, ErrorCategory};
use thiserror::Error;

/// Errors raised while reconciling and rendering the fiber tree.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RenderError {
    /// A function or class component's render call returned an error.
    #[error("render failed in {component}: {message}")]
    ComponentFailed {
        /// Name of the component that failed.
        component: String,
        /// Error message.
        message: String,
    },

    /// An `onAfterCompile`/`onError`/lifecycle hook raised an error.
    #[error("lifecycle hook failed: {0}")]
    LifecycleHookFailed(String),

    /// A hook-runtime invariant was violated (see [`HookError`]).
    #[error(transparent)]
    Hook(#[from] HookError),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl Classify for RenderError {
    fn category(&self) -> ErrorCategory {
        match self {
            RenderError::Hook(_) => ErrorCategory::Application,
            _ => ErrorCategory::Application,
        }
    }
}

/// Errors from the hook runtime. These are always programming errors
/// (a component violated the rules of hooks) and are fail-fast per
/// `spec.md` §4.2/§8 and §9's resolution of the source's TODO.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HookError {
    /// A hook function was called outside of an active render.
    #[error("invalid hook call: {hook} called outside render")]
    InvalidHookCall {
        /// Name of the hook that was misused.
        hook: &'static str,
    },

    /// The number or order of hooks differed between two renders of
    /// the same fiber.
    #[error(
        "hook order violated on fiber {fiber}: rendered {old_count} hooks previously, {new_count} this time"
    )]
    OrderViolation {
        /// The fiber whose hook chain mismatched.
        fiber: String,
        /// Number of hooks in the previous render.
        old_count: usize,
        /// Number of hooks in this render (so far).
        new_count: usize,
    },

    /// A hook was read back as the wrong type (cell reused with a
    /// mismatched value type across renders).
    #[error("hook {index} on fiber {fiber} changed type between renders")]
    TypeMismatch {
        /// The fiber whose hook chain mismatched.
        fiber: String,
        /// Index of the mismatched hook cell.
        index: usize,
    },
}
