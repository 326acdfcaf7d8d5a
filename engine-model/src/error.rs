//! Errors from a model adapter call.

use engine_types::{Classify, ErrorCategory};
use thiserror::Error;

/// Errors a [`crate::ModelAdapter`] may raise. Mirrors the teacher's
/// per-provider `ProviderError` (`neuron-turn::provider`), widened to
/// the adapter boundary this engine dispatches to.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ModelError {
    /// HTTP or network request failed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The provider rate-limited the request.
    #[error("rate limited")]
    RateLimited,

    /// Authentication/authorization failed.
    #[error("auth failed: {0}")]
    AuthFailed(String),

    /// The request exceeded its deadline.
    #[error("request timed out")]
    Timeout,

    /// Could not parse the provider's response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// No model adapter was configured for this execution.
    #[error("no model configured")]
    NoModelConfigured,

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl Classify for ModelError {
    fn category(&self) -> ErrorCategory {
        match self {
            ModelError::RequestFailed(_) => ErrorCategory::Network,
            ModelError::RateLimited => ErrorCategory::RateLimit,
            ModelError::AuthFailed(_) => ErrorCategory::Authentication,
            ModelError::Timeout => ErrorCategory::Timeout,
            ModelError::InvalidResponse(_) | ModelError::NoModelConfigured => ErrorCategory::Validation,
            ModelError::Other(_) => ErrorCategory::Unknown,
        }
    }
}
