//! # pullstream
//!
//! Lazy, pull-based streams over a stack-safe asynchronous task, with a
//! bounded parallel engine on top.
//!
#![deny(unsafe_code)]

//! ## Features
//!
//! - **Lazy by construction**: building a stream or task runs nothing; terminal
//!   operations return a [`Task`] that does the work when it is run.
//! - **Stack safe**: tasks are evaluated by a trampolined loop, so chains of
//!   tens of thousands of combinators and millions of elements run in constant
//!   stack depth. Dropping a deep chain is iterative too.
//! - **Bounded parallelism**: `par_eval_map`, `par_eval_map_unordered`,
//!   `par_eval_flat_map`, `merge` and `par_collect` never exceed their
//!   concurrency bound and cancel all in-flight work on the first failure.
//! - **One error type**: every failure is a [`StreamError`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pullstream::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StreamError> {
//!     let squares = Stream::range(1, 1_000_000)
//!         .filter(|n| n % 3 == 0)
//!         .map(|n| n * n)
//!         .take(5)
//!         .to_list()
//!         .run()
//!         .await?;
//!     println!("{squares:?}");
//!
//!     let doubled = Stream::of(1..=100)
//!         .par_eval_map(8, |n| Task::from_future(async move { Ok(n * 2) }))?
//!         .fold(0, |a, b| a + b)
//!         .run()
//!         .await?;
//!     println!("{doubled}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod parallel;
pub mod retry;
pub mod stream;
pub mod task;
pub mod telemetry;
pub mod utils;

pub use config::ParallelConfig;
pub use error::{ErrorCategory, Result, StreamError};
pub use parallel::{
    merge, merge2, par_collect, par_eval_flat_map, par_eval_flat_map_with, par_eval_map,
    par_eval_map_unordered, par_eval_map_unordered_with, par_eval_map_with,
};
pub use retry::{RetryExecutor, RetryPolicy};
pub use stream::{Step, Stream};
pub use task::Task;
pub use utils::cancel::CancelHandle;

/// Commonly used types.
pub mod prelude {
    pub use crate::config::ParallelConfig;
    pub use crate::error::{Result, StreamError};
    pub use crate::parallel::{merge, merge2};
    pub use crate::retry::RetryPolicy;
    pub use crate::stream::{Step, Stream};
    pub use crate::task::Task;
    pub use crate::utils::cancel::CancelHandle;
}
