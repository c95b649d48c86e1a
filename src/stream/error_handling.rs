//! Failure handling on streams
//!
//! Every operator here wraps each pull of the source and re-wraps the
//! continuation, so it sees a failure at any position. Elements produced
//! before the failure are never affected.

use std::sync::Arc;
use std::time::Duration;

use super::{Step, Stream};
use crate::error::StreamError;
use crate::task::Task;

impl<A: Send + 'static> Stream<A> {
    /// On a failed pull, emit `handler(error)` and finish.
    pub fn recover<H>(self, handler: H) -> Self
    where
        H: Fn(StreamError) -> A + Send + Sync + 'static,
    {
        recover_with_value(self, Arc::new(handler))
    }

    /// On a failed pull, continue with the stream `handler(error)`.
    pub fn recover_with<H>(self, handler: H) -> Self
    where
        H: Fn(StreamError) -> Stream<A> + Send + Sync + 'static,
    {
        recover_with_stream(self, Arc::new(handler))
    }

    /// Rewrite the error of a failed pull.
    pub fn map_err<F>(self, f: F) -> Self
    where
        F: Fn(StreamError) -> StreamError + Send + Sync + 'static,
    {
        map_err_with(self, Arc::new(f))
    }

    /// Observe a failed pull without handling it.
    pub fn on_error<F>(self, action: F) -> Self
    where
        F: Fn(&StreamError) + Send + Sync + 'static,
    {
        let action = Arc::new(action);
        self.map_err(move |error| {
            action(&error);
            error
        })
    }

    /// Fail any single pull that takes longer than `limit` with
    /// [`StreamError::Timeout`].
    pub fn with_pull_timeout(self, limit: Duration) -> Self {
        Self::from_pull(move || {
            self.deferred_pull()
                .timeout(limit)
                .map(move |step| rewrap(step, |tail| tail.with_pull_timeout(limit)))
        })
    }
}

fn rewrap<A, W>(step: Step<A>, wrap: W) -> Step<A>
where
    A: Send + 'static,
    W: FnOnce(Stream<A>) -> Stream<A>,
{
    match step {
        Step::Emit(value, tail) => Step::Emit(value, wrap(tail)),
        Step::Skip(tail) => Step::Skip(wrap(tail)),
        Step::Done => Step::Done,
    }
}

fn recover_with_value<A, H>(source: Stream<A>, handler: Arc<H>) -> Stream<A>
where
    A: Send + 'static,
    H: Fn(StreamError) -> A + Send + Sync + 'static,
{
    Stream::from_pull(move || {
        let tail_handler = handler.clone();
        let handler = handler.clone();
        source
            .deferred_pull()
            .map(move |step| rewrap(step, |tail| recover_with_value(tail, tail_handler)))
            .recover(move |error| {
                tracing::debug!(error = %error, "stream recovered with fallback element");
                Step::Emit(handler(error), Stream::empty())
            })
    })
}

fn recover_with_stream<A, H>(source: Stream<A>, handler: Arc<H>) -> Stream<A>
where
    A: Send + 'static,
    H: Fn(StreamError) -> Stream<A> + Send + Sync + 'static,
{
    Stream::from_pull(move || {
        let tail_handler = handler.clone();
        let handler = handler.clone();
        source
            .deferred_pull()
            .map(move |step| rewrap(step, |tail| recover_with_stream(tail, tail_handler)))
            .recover_with(move |error| {
                tracing::debug!(error = %error, "stream switched to fallback stream");
                Task::pure(Step::Skip(handler(error)))
            })
    })
}

fn map_err_with<A, F>(source: Stream<A>, f: Arc<F>) -> Stream<A>
where
    A: Send + 'static,
    F: Fn(StreamError) -> StreamError + Send + Sync + 'static,
{
    Stream::from_pull(move || {
        let tail_f = f.clone();
        let f = f.clone();
        source
            .deferred_pull()
            .map(move |step| rewrap(step, |tail| map_err_with(tail, tail_f)))
            .map_err(move |error| f(error))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn failing_at_three() -> Stream<i32> {
        Stream::of(1..=5).try_map(|n| {
            if n == 3 {
                Err(StreamError::production("three"))
            } else {
                Ok(n)
            }
        })
    }

    #[tokio::test]
    async fn recover_emits_fallback_then_finishes() {
        let out = failing_at_three().recover(|_| -1).to_list().run().await;
        assert_eq!(out, Ok(vec![1, 2, -1]));
    }

    #[tokio::test]
    async fn recover_with_switches_streams() {
        let out = failing_at_three()
            .recover_with(|_| Stream::of([10, 20]))
            .to_list()
            .run()
            .await;
        assert_eq!(out, Ok(vec![1, 2, 10, 20]));
    }

    #[tokio::test]
    async fn recover_on_healthy_stream_is_transparent() {
        let out = Stream::of(1..=3).recover(|_| 0).to_list().run().await;
        assert_eq!(out, Ok(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn map_err_rewrites_and_stops() {
        let out = failing_at_three()
            .map_err(|e| StreamError::user(format!("wrapped {e}")))
            .to_list()
            .run()
            .await;
        assert_eq!(
            out,
            Err(StreamError::user(
                "wrapped Element production failed: three"
            ))
        );
    }

    #[tokio::test]
    async fn on_error_observes_once() {
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let out = failing_at_three()
            .on_error(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .count()
            .run()
            .await;
        assert!(out.is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_pull_times_out() {
        let slow: Stream<i32> = Stream::from_pull(|| {
            Task::from_future(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Step::Done)
            })
        });
        let err = Stream::of([1])
            .concat(slow)
            .with_pull_timeout(Duration::from_millis(20))
            .to_list()
            .run()
            .await
            .unwrap_err();
        assert_eq!(err, StreamError::Timeout(Duration::from_millis(20)));
        assert!(err.is_interruption());
    }
}
