//! Utility modules for pullstream

pub mod cancel;

pub use cancel::{CancelHandle, make_cancellable_stream, new_cancel_handle};
