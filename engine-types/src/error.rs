//! Shared error classification.
//!
//! `spec.md` §7 describes an error taxonomy "by effect, not by type
//! name": network, rate-limit, authentication, validation, timeout,
//! abort, application, unknown. Each crate's concrete error enum stays
//! specific to its own boundary (render errors, tool errors, model
//! errors, ...) per the teacher's per-protocol split, but all of them
//! classify into one of these categories via [`Retryable`] /
//! [`Classify`], so the orchestrator's recovery policy (§7) can make
//! retry/halt decisions without matching on every concrete error type.

use serde::{Deserialize, Serialize};

/// The effect-based error category from `spec.md` §7.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Transient network failure. Recoverable.
    Network,
    /// Provider rate-limited the request. Recoverable with backoff.
    RateLimit,
    /// Credentials rejected. Not recoverable.
    Authentication,
    /// Input failed validation. Not recoverable.
    Validation,
    /// Operation exceeded its deadline. Recoverable.
    Timeout,
    /// Execution was aborted. Terminal, never recoverable.
    Abort,
    /// Uncategorized application-level failure.
    Application,
    /// Nothing more specific is known.
    Unknown,
}

impl ErrorCategory {
    /// Whether the orchestrator's default policy should consider
    /// retrying an operation that failed with this category.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::RateLimit | ErrorCategory::Timeout)
    }

    /// Whether this category can ever be recovered from via an
    /// `onError` component hook (abort never can — it is terminal).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ErrorCategory::Abort)
    }
}

/// Implemented by every concrete error enum in the engine so callers
/// can classify an error without matching on its concrete type.
pub trait Classify {
    /// Classify this error into a [`ErrorCategory`].
    fn category(&self) -> ErrorCategory;

    /// Convenience: `self.category().is_retryable()`.
    fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_rate_limit_and_timeout_are_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::RateLimit.is_retryable());
        assert!(ErrorCategory::Timeout.is_retryable());
    }

    #[test]
    fn auth_and_validation_are_not_retryable() {
        assert!(!ErrorCategory::Authentication.is_retryable());
        assert!(!ErrorCategory::Validation.is_retryable());
    }

    #[test]
    fn abort_is_never_recoverable() {
        assert!(!ErrorCategory::Abort.is_recoverable());
        assert!(ErrorCategory::Application.is_recoverable());
    }
}
