//! Retry module
//!
//! Policy-based retries for tasks ([`Task::retry`](crate::Task::retry)) and
//! stream pulls ([`Stream::retry_pulls`](crate::Stream::retry_pulls)).

pub mod policy;

pub use policy::*;
