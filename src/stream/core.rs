//! Stream core
//!
//! A `Stream` is nothing but a shareable pull operation. Every factory and
//! combinator builds a new pull closing over its inputs, so streams are
//! immutable values that can be traversed again from any retained handle.

use std::fmt;
use std::sync::Arc;

use super::Step;
use super::release::release;
use crate::error::StreamError;
use crate::task::Task;

type PullFn<A> = dyn Fn() -> Task<Step<A>> + Send + Sync;

/// A lazy, pull-based sequence of `A`.
///
/// Cloning is an `Arc` increment. Nothing is evaluated until a terminal
/// operation runs the task returned by [`Stream::pull`].
pub struct Stream<A: Send + 'static> {
    // Always `Some` outside of `Drop`.
    pull: Option<Arc<PullFn<A>>>,
}

impl<A: Send + 'static> Stream<A> {
    /// Build a stream from its pull operation.
    pub fn from_pull<F>(pull: F) -> Self
    where
        F: Fn() -> Task<Step<A>> + Send + Sync + 'static,
    {
        Self {
            pull: Some(Arc::new(pull)),
        }
    }

    /// Describe the next step. Running the returned task performs the work.
    pub fn pull(&self) -> Task<Step<A>> {
        match &self.pull {
            Some(pull) => pull(),
            None => Task::fail(StreamError::internal("stream pulled while being released")),
        }
    }

    /// Like [`Stream::pull`], but the pull itself is only invoked when the task
    /// is evaluated.
    ///
    /// Combinators wrap their source through this so that pulling a stack of
    /// N combinators becomes N iterations of the task run loop instead of N
    /// nested calls.
    pub(crate) fn deferred_pull(&self) -> Task<Step<A>> {
        let source = self.clone();
        Task::defer(move || source.pull())
    }

    /// Build the stream lazily, once per traversal.
    ///
    /// Enables recursive definitions and per-traversal state.
    pub fn defer<F>(supplier: F) -> Self
    where
        F: Fn() -> Stream<A> + Send + Sync + 'static,
    {
        let supplier = Arc::new(supplier);
        Self::from_pull(move || {
            let supplier = supplier.clone();
            Task::defer(move || supplier().pull())
        })
    }
}

impl<A: Send + 'static> Clone for Stream<A> {
    fn clone(&self) -> Self {
        Self {
            pull: self.pull.clone(),
        }
    }
}

impl<A: Send + 'static> Drop for Stream<A> {
    fn drop(&mut self) {
        if let Some(pull) = self.pull.take() {
            // Only the last handle tears down the nested chain.
            if Arc::strong_count(&pull) == 1 {
                release(pull);
            }
        }
    }
}

impl<A: Send + 'static> fmt::Debug for Stream<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("element", &std::any::type_name::<A>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn pull_runs_nothing_until_task_runs() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let p = pulls.clone();
        let stream: Stream<i32> = Stream::from_pull(move || {
            let p = p.clone();
            Task::delay(move || {
                p.fetch_add(1, Ordering::SeqCst);
                Step::Done
            })
        });

        let task = stream.pull();
        assert_eq!(pulls.load(Ordering::SeqCst), 0);
        assert!(task.run().await.unwrap().is_done());
        assert_eq!(pulls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn defer_builds_once_per_pull_of_the_head() {
        let builds = Arc::new(AtomicUsize::new(0));
        let b = builds.clone();
        let stream = Stream::defer(move || {
            b.fetch_add(1, Ordering::SeqCst);
            Stream::of([1, 2])
        });
        assert_eq!(builds.load(Ordering::SeqCst), 0);
        assert_eq!(stream.to_list().run().await, Ok(vec![1, 2]));
        assert_eq!(stream.to_list().run().await, Ok(vec![1, 2]));
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_a_deep_chain_does_not_recurse() {
        let mut stream = Stream::of([0u64]);
        for _ in 0..100_000 {
            stream = stream.map(|n| n + 1);
        }
        drop(stream);
    }
}
