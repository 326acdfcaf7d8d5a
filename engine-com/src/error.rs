//! COM-level errors.

use engine_types::{Classify, ErrorCategory};
use thiserror::Error;

/// Errors raised by COM operations. Most COM operations are
/// infallible by design (`spec.md` §4.4's table has no error column);
/// this enum exists for the few that can fail — ref resolution,
/// state-key type mismatches surfaced by typed accessors built atop
/// the raw `Value` store.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ComError {
    /// No model adapter is configured and none was supplied by the caller.
    #[error("no model configured for this execution")]
    NoModelConfigured,

    /// A typed state accessor found a value of the wrong shape.
    #[error("state key {key} held a value that did not deserialize as the requested type: {message}")]
    StateTypeMismatch {
        /// The offending key.
        key: String,
        /// Deserialization failure detail.
        message: String,
    },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl Classify for ComError {
    fn category(&self) -> ErrorCategory {
        match self {
            ComError::NoModelConfigured => ErrorCategory::Validation,
            ComError::StateTypeMismatch { .. } => ErrorCategory::Validation,
            ComError::Other(_) => ErrorCategory::Unknown,
        }
    }
}
