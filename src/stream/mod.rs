//! Lazy pull-based streams
//!
//! A [`Stream`] is a description of how to obtain its next [`Step`]. Building
//! and combining streams runs nothing; terminal operations such as
//! [`Stream::to_list`] return a [`Task`](crate::Task) that performs the pulls
//! when it is run.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pullstream::Stream;
//!
//! let evens = Stream::iterate(1, |n| n + 1)
//!     .filter(|n| n % 2 == 0)
//!     .take(3)
//!     .to_list()
//!     .run()
//!     .await?;
//! assert_eq!(evens, vec![2, 4, 6]);
//! ```

mod chunk;
mod combinators;
mod core;
mod error_handling;
mod factory;
pub(crate) mod release;
mod step;
mod terminal;

pub use self::core::Stream;
pub use step::Step;
