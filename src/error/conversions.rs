//! Type Conversions for StreamError
//!
//! This module contains From trait implementations for converting
//! runtime error types into StreamError.

use super::types::StreamError;

impl From<tokio::task::JoinError> for StreamError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            return Self::Cancelled("task aborted by its scope".to_string());
        }
        match err.try_into_panic() {
            Ok(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                Self::Panicked(message)
            }
            Err(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        Self::Production(err.to_string())
    }
}
