//! Error Handling Module
//!
//! This module provides the error taxonomy shared by tasks, streams and the
//! parallel engine:
//! - Core error types (`StreamError`, `ErrorCategory`)
//! - Type conversions from runtime error types
//!
//! # Example
//!
//! ```rust,ignore
//! use pullstream::error::{ErrorCategory, StreamError};
//!
//! let error = StreamError::invalid_argument("concurrency must be positive, got: 0");
//! assert_eq!(error.category(), ErrorCategory::InvalidArgument);
//! assert!(!error.is_retryable());
//! ```

// Module declarations
mod conversions;
pub mod types;

// Re-exports for public API
pub use types::*;
pub(crate) use types::require_positive;
