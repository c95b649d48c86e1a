//! Async Task
//!
//! A lazy, single-result asynchronous computation. Building a `Task` runs
//! nothing; work happens only when it is driven with [`Task::run`] or
//! [`Task::run_blocking`]. Streams execute tasks exclusively through `pull()`.
//!
//! # Example
//!
//! ```rust,ignore
//! use pullstream::Task;
//!
//! let task = Task::delay(|| 20).map(|n| n + 1).and_then(|n| Task::pure(n * 2));
//! assert_eq!(task.run().await?, 42);
//! ```

pub(crate) mod trampoline;

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use crate::error::{Result, StreamError};
use trampoline::{Op, downcast, erase, evaluate};

/// Lazy single-result computation.
///
/// Composition builds an instruction tree evaluated by a trampolined run loop,
/// so arbitrarily deep `map`/`and_then`/`defer` chains are stack safe.
#[must_use = "tasks are lazy and do nothing unless run"]
pub struct Task<A> {
    op: Op,
    _marker: PhantomData<fn() -> A>,
}

impl<A> fmt::Debug for Task<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("output", &std::any::type_name::<A>())
            .finish_non_exhaustive()
    }
}

impl<A: Send + 'static> Task<A> {
    fn from_op(op: Op) -> Self {
        Self {
            op,
            _marker: PhantomData,
        }
    }

    /// A task that succeeds with `value`.
    pub fn pure(value: A) -> Self {
        Self::from_op(Op::Pure(erase(value)))
    }

    /// Alias of [`Task::pure`].
    pub fn succeed(value: A) -> Self {
        Self::pure(value)
    }

    /// A task that fails with `error`.
    pub fn fail(error: StreamError) -> Self {
        Self::from_op(Op::Fail(error))
    }

    /// Suspend a synchronous computation until the task runs.
    pub fn delay<F>(thunk: F) -> Self
    where
        F: FnOnce() -> A + Send + 'static,
    {
        Self::from_op(Op::Delay(Box::new(move || Ok(erase(thunk())))))
    }

    /// Suspend a fallible synchronous computation.
    pub fn of<F>(thunk: F) -> Self
    where
        F: FnOnce() -> Result<A> + Send + 'static,
    {
        Self::from_op(Op::Delay(Box::new(move || thunk().map(erase))))
    }

    /// Build the task itself lazily.
    pub fn defer<F>(thunk: F) -> Self
    where
        F: FnOnce() -> Task<A> + Send + 'static,
    {
        Self::from_op(Op::Defer(Box::new(move || thunk().op)))
    }

    /// Wrap a future. The future is not polled until the task runs.
    pub fn from_future<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<A>> + Send + 'static,
    {
        Self::from_op(Op::Future(Box::pin(async move { future.await.map(erase) })))
    }

    pub fn map<B, F>(self, f: F) -> Task<B>
    where
        B: Send + 'static,
        F: FnOnce(A) -> B + Send + 'static,
    {
        Task::from_op(Op::Map(
            Box::new(self.op),
            Box::new(move |value| downcast::<A>(value).map(|a| erase(f(a)))),
        ))
    }

    /// Map with a fallible function; an `Err` fails the task.
    pub fn try_map<B, F>(self, f: F) -> Task<B>
    where
        B: Send + 'static,
        F: FnOnce(A) -> Result<B> + Send + 'static,
    {
        Task::from_op(Op::Map(
            Box::new(self.op),
            Box::new(move |value| downcast::<A>(value).and_then(f).map(erase)),
        ))
    }

    /// Sequence another task after this one (flatMap).
    pub fn and_then<B, F>(self, f: F) -> Task<B>
    where
        B: Send + 'static,
        F: FnOnce(A) -> Task<B> + Send + 'static,
    {
        Task::from_op(Op::FlatMap(
            Box::new(self.op),
            Box::new(move |value| match downcast::<A>(value) {
                Ok(a) => f(a).op,
                Err(error) => Op::Fail(error),
            }),
        ))
    }

    /// Replace a failure with a value.
    pub fn recover<F>(self, handler: F) -> Self
    where
        F: FnOnce(StreamError) -> A + Send + 'static,
    {
        Self::from_op(Op::Recover(
            Box::new(self.op),
            Box::new(move |error| Op::Pure(erase(handler(error)))),
        ))
    }

    /// Replace a failure with another task.
    pub fn recover_with<F>(self, handler: F) -> Self
    where
        F: FnOnce(StreamError) -> Task<A> + Send + 'static,
    {
        Self::from_op(Op::Recover(
            Box::new(self.op),
            Box::new(move |error| handler(error).op),
        ))
    }

    /// Rewrite a failure.
    pub fn map_err<F>(self, f: F) -> Self
    where
        F: FnOnce(StreamError) -> StreamError + Send + 'static,
    {
        Self::from_op(Op::Recover(
            Box::new(self.op),
            Box::new(move |error| Op::Fail(f(error))),
        ))
    }

    /// Observe the value without changing it.
    pub fn inspect<F>(self, f: F) -> Self
    where
        F: FnOnce(&A) + Send + 'static,
    {
        self.map(move |a| {
            f(&a);
            a
        })
    }

    /// Observe a failure without recovering from it.
    pub fn inspect_err<F>(self, f: F) -> Self
    where
        F: FnOnce(&StreamError) + Send + 'static,
    {
        self.map_err(move |error| {
            f(&error);
            error
        })
    }

    /// Safe-run variant: a task that never fails, carrying the outcome as a value.
    pub fn attempt(self) -> Task<Result<A>> {
        self.map(Ok).recover(Err)
    }

    /// Fail with [`StreamError::Timeout`] if the task does not finish within `duration`.
    ///
    /// Requires a tokio runtime with the time driver enabled.
    pub fn timeout(self, duration: Duration) -> Self {
        Self::from_future(async move {
            match tokio::time::timeout(duration, self.run()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(StreamError::Timeout(duration)),
            }
        })
    }

    /// Drive the task to completion.
    pub async fn run(self) -> Result<A> {
        evaluate(self.op).await.and_then(downcast::<A>)
    }

    /// Drive the task on a private current-thread runtime.
    ///
    /// Must not be called from within an async context.
    pub fn run_blocking(self) -> Result<A> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StreamError::internal(format!("failed to build runtime: {e}")))?;
        runtime.block_on(self.run())
    }
}

impl<A: Send + 'static> From<Result<A>> for Task<A> {
    fn from(result: Result<A>) -> Self {
        match result {
            Ok(value) => Self::pure(value),
            Err(error) => Self::fail(error),
        }
    }
}
