//! Core error types.

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Every failure a task, stream or parallel operation can surface.
///
/// Payloads are plain strings so the error stays `Clone` and can be handed to
/// every consumer of a failed parallel operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// The task behind a pull failed while producing an element.
    #[error("Element production failed: {0}")]
    Production(String),

    /// A user-supplied transform or predicate failed.
    #[error("User function failed: {0}")]
    UserFunction(String),

    /// A concurrency bound, chunk size or similar argument was rejected at call time.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A wrapping layer gave up waiting.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The computation was cancelled before it produced a result.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A concurrently running unit panicked.
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// Broken internal invariant.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse grouping of [`StreamError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Element production or user function failures.
    Execution,
    /// Arguments rejected eagerly.
    InvalidArgument,
    /// Timeouts and cancellations injected from outside.
    Interruption,
    /// Panics and internal invariant violations.
    Internal,
}

impl StreamError {
    pub fn production(message: impl Into<String>) -> Self {
        Self::Production(message.into())
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self::UserFunction(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Category of this error.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Production(_) | Self::UserFunction(_) => ErrorCategory::Execution,
            Self::InvalidArgument(_) => ErrorCategory::InvalidArgument,
            Self::Timeout(_) | Self::Cancelled(_) => ErrorCategory::Interruption,
            Self::Panicked(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// True for timeouts and cancellations.
    pub const fn is_interruption(&self) -> bool {
        matches!(self.category(), ErrorCategory::Interruption)
    }

    /// Whether re-running the failed computation may succeed.
    ///
    /// Production failures and timeouts are considered transient; everything
    /// else is deterministic or deliberate.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Production(_) | Self::Timeout(_))
    }
}

/// Validate a concurrency bound or batch size eagerly.
pub(crate) fn require_positive(name: &str, value: usize) -> Result<usize> {
    if value == 0 {
        return Err(StreamError::invalid_argument(format!(
            "{name} must be positive, got: {value}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_group_variants() {
        assert_eq!(
            StreamError::production("boom").category(),
            ErrorCategory::Execution
        );
        assert_eq!(StreamError::user("bad").category(), ErrorCategory::Execution);
        assert_eq!(
            StreamError::Timeout(Duration::from_millis(5)).category(),
            ErrorCategory::Interruption
        );
        assert!(StreamError::cancelled("scope closed").is_interruption());
        assert!(!StreamError::internal("x").is_interruption());
    }

    #[test]
    fn retryable_only_for_transient_failures() {
        assert!(StreamError::production("io").is_retryable());
        assert!(StreamError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!StreamError::user("parse").is_retryable());
        assert!(!StreamError::invalid_argument("k").is_retryable());
    }

    #[test]
    fn require_positive_rejects_zero() {
        let err = require_positive("concurrency", 0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument: concurrency must be positive, got: 0"
        );
        assert_eq!(require_positive("concurrency", 4), Ok(4));
    }
}
