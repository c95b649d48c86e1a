//! Bounded parallel evaluation
//!
//! Operations that run element computations or whole sub-streams
//! concurrently on the tokio runtime, never exceeding a concurrency bound.
//!
//! All of them share three rules:
//! - the bound is validated when the operation is built; zero is rejected
//!   with [`StreamError::InvalidArgument`](crate::StreamError::InvalidArgument);
//! - nothing is dispatched until the resulting stream is pulled;
//! - the first failure cancels every other in-flight unit of the operation
//!   and becomes the stream's failure.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pullstream::{Stream, Task};
//!
//! let profiles = Stream::of(user_ids)
//!     .par_eval_map(8, |id| Task::from_future(fetch_profile(id)))?
//!     .to_list()
//!     .run()
//!     .await?;
//! ```

mod fan_in;
mod pump;
mod scope;
mod window;

use std::sync::Arc;

use crate::config::ParallelConfig;
use crate::error::{Result, require_positive};
use crate::stream::Stream;
use crate::task::Task;
use fan_in::FanIn;
use pump::pumped;
use window::{Emission, Window};

/// Apply `f` to every element with at most `concurrency` computations in
/// flight, emitting results in source order.
pub fn par_eval_map<A, B, F>(stream: Stream<A>, concurrency: usize, f: F) -> Result<Stream<B>>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Task<B> + Send + Sync + 'static,
{
    let limit = require_positive("concurrency", concurrency)?;
    Ok(windowed(stream, limit, Emission::SourceOrder, f))
}

/// Like [`par_eval_map`], emitting results as they complete.
pub fn par_eval_map_unordered<A, B, F>(
    stream: Stream<A>,
    concurrency: usize,
    f: F,
) -> Result<Stream<B>>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Task<B> + Send + Sync + 'static,
{
    let limit = require_positive("concurrency", concurrency)?;
    Ok(windowed(stream, limit, Emission::CompletionOrder, f))
}

/// Expand every element into a sub-stream and drive up to `concurrency`
/// sub-streams at once. Outputs are interleaved as they arrive.
pub fn par_eval_flat_map<A, B, F>(stream: Stream<A>, concurrency: usize, f: F) -> Result<Stream<B>>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Stream<B> + Send + Sync + 'static,
{
    let config = ParallelConfig::default().with_concurrency(concurrency);
    par_eval_flat_map_with(stream, &config, f)
}

/// Drive every stream concurrently and multiplex their elements.
///
/// Each source keeps its own order; there is no order across sources.
pub fn merge<A: Send + 'static>(streams: Vec<Stream<A>>) -> Stream<A> {
    let count = streams.len();
    match count {
        0 => Stream::empty(),
        1 => streams.into_iter().next().unwrap_or_else(Stream::empty),
        _ => {
            let capacity = ParallelConfig::default().channel_capacity;
            fanned_in(Stream::from_collection(streams), count, capacity)
        }
    }
}

/// Two-stream [`merge`].
pub fn merge2<A: Send + 'static>(left: Stream<A>, right: Stream<A>) -> Stream<A> {
    merge(vec![left, right])
}

/// Collect every element, processing `batch_size`-element chunks concurrently.
///
/// The result keeps source order.
pub fn par_collect<A: Send + 'static>(stream: Stream<A>, batch_size: usize) -> Result<Task<Vec<A>>> {
    let batches = stream.chunk(batch_size)?;
    let concurrency = ParallelConfig::default().concurrency;
    let collected = par_eval_map(batches, concurrency, Task::pure)?;
    Ok(collected.fold_left(Vec::new(), |mut all, batch| {
        all.extend(batch);
        all
    }))
}

/// [`par_eval_map`] bounded by `config`.
pub fn par_eval_map_with<A, B, F>(stream: Stream<A>, config: &ParallelConfig, f: F) -> Result<Stream<B>>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Task<B> + Send + Sync + 'static,
{
    let config = config.validate()?;
    Ok(windowed(stream, config.concurrency, Emission::SourceOrder, f))
}

/// [`par_eval_map_unordered`] bounded by `config`.
pub fn par_eval_map_unordered_with<A, B, F>(
    stream: Stream<A>,
    config: &ParallelConfig,
    f: F,
) -> Result<Stream<B>>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Task<B> + Send + Sync + 'static,
{
    let config = config.validate()?;
    Ok(windowed(stream, config.concurrency, Emission::CompletionOrder, f))
}

/// [`par_eval_flat_map`] bounded by `config`; the channel capacity sizes the
/// buffer between sub-stream producers and the consumer.
pub fn par_eval_flat_map_with<A, B, F>(
    stream: Stream<A>,
    config: &ParallelConfig,
    f: F,
) -> Result<Stream<B>>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Stream<B> + Send + Sync + 'static,
{
    let config = config.validate()?;
    Ok(fanned_in(stream.map(f), config.concurrency, config.channel_capacity))
}

fn windowed<A, B, F>(stream: Stream<A>, limit: usize, emission: Emission, f: F) -> Stream<B>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Task<B> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    pumped(move || Window::new(stream.clone(), limit, emission, f.clone()))
}

fn fanned_in<B: Send + 'static>(
    sources: Stream<Stream<B>>,
    limit: usize,
    channel_capacity: usize,
) -> Stream<B> {
    pumped(move || FanIn::new(sources.clone(), limit, channel_capacity))
}

impl<A: Send + 'static> Stream<A> {
    /// See [`par_eval_map`].
    pub fn par_eval_map<B, F>(self, concurrency: usize, f: F) -> Result<Stream<B>>
    where
        B: Send + 'static,
        F: Fn(A) -> Task<B> + Send + Sync + 'static,
    {
        par_eval_map(self, concurrency, f)
    }

    /// See [`par_eval_map_unordered`].
    pub fn par_eval_map_unordered<B, F>(self, concurrency: usize, f: F) -> Result<Stream<B>>
    where
        B: Send + 'static,
        F: Fn(A) -> Task<B> + Send + Sync + 'static,
    {
        par_eval_map_unordered(self, concurrency, f)
    }

    /// See [`par_eval_flat_map`].
    pub fn par_eval_flat_map<B, F>(self, concurrency: usize, f: F) -> Result<Stream<B>>
    where
        B: Send + 'static,
        F: Fn(A) -> Stream<B> + Send + Sync + 'static,
    {
        par_eval_flat_map(self, concurrency, f)
    }

    /// See [`merge2`].
    pub fn merge(self, other: Stream<A>) -> Stream<A> {
        merge2(self, other)
    }

    /// See [`par_collect`].
    pub fn par_collect(self, batch_size: usize) -> Result<Task<Vec<A>>> {
        par_collect(self, batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks how many units run at once.
    #[derive(Clone, Default)]
    struct Gauge {
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    fn slow_double(gauge: Gauge) -> impl Fn(u64) -> Task<u64> + Send + Sync + 'static {
        move |n| {
            let gauge = gauge.clone();
            Task::from_future(async move {
                gauge.enter();
                // Later elements finish first.
                tokio::time::sleep(Duration::from_millis(20 - n % 20)).await;
                gauge.exit();
                Ok(n * 2)
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn par_eval_map_preserves_order_within_bound() {
        let gauge = Gauge::default();
        let out = Stream::of(0..40u64)
            .par_eval_map(4, slow_double(gauge.clone()))
            .unwrap()
            .to_list()
            .run()
            .await
            .unwrap();
        assert_eq!(out, (0..40).map(|n| n * 2).collect::<Vec<_>>());
        assert!(gauge.peak() <= 4, "peak {} exceeded bound", gauge.peak());
        assert!(gauge.peak() >= 2, "expected overlap, peak {}", gauge.peak());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn unordered_emits_everything_within_bound() {
        let gauge = Gauge::default();
        let mut out = Stream::of(0..30u64)
            .par_eval_map_unordered(3, slow_double(gauge.clone()))
            .unwrap()
            .to_list()
            .run()
            .await
            .unwrap();
        out.sort_unstable();
        assert_eq!(out, (0..30).map(|n| n * 2).collect::<Vec<_>>());
        assert!(gauge.peak() <= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn first_failure_cancels_the_rest() {
        let finished = Arc::new(AtomicUsize::new(0));
        let f = finished.clone();
        let out = Stream::of(0..8u64)
            .par_eval_map(8, move |n| {
                let f = f.clone();
                Task::from_future(async move {
                    if n == 3 {
                        return Err(StreamError::user("three"));
                    }
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    f.fetch_add(1, Ordering::SeqCst);
                    Ok(n)
                })
            })
            .unwrap()
            .to_list()
            .run()
            .await;
        assert_eq!(out, Err(StreamError::user("three")));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_concurrency_is_rejected() {
        let err = par_eval_map(Stream::of([1]), 0, Task::pure).unwrap_err();
        assert_eq!(
            err,
            StreamError::invalid_argument("concurrency must be positive, got: 0")
        );
        assert!(par_eval_map_unordered(Stream::of([1]), 0, Task::pure).is_err());
        assert!(par_eval_flat_map(Stream::of([1]), 0, Stream::once).is_err());
        assert!(par_collect(Stream::of([1]), 0).is_err());
    }

    #[tokio::test]
    async fn nothing_runs_until_pulled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let stream = Stream::of(1..=3).par_eval_map(2, move |n| {
            c.fetch_add(1, Ordering::SeqCst);
            Task::pure(n)
        });
        assert!(stream.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_source_yields_empty() {
        let out = Stream::<u64>::empty()
            .par_eval_map(3, Task::pure)
            .unwrap()
            .to_list()
            .run()
            .await;
        assert_eq!(out, Ok(vec![]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn flat_map_bounds_active_sub_streams() {
        let gauge = Gauge::default();
        let g = gauge.clone();
        let mut out = Stream::of(0..6u64)
            .par_eval_flat_map(2, move |n| {
                let g = g.clone();
                Stream::of(0..3u64).map_task(move |i| {
                    let g = g.clone();
                    Task::from_future(async move {
                        g.enter();
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        g.exit();
                        Ok(n * 10 + i)
                    })
                })
            })
            .unwrap()
            .to_list()
            .run()
            .await
            .unwrap();
        out.sort_unstable();
        let expected: Vec<u64> = (0..6).flat_map(|n| (0..3).map(move |i| n * 10 + i)).collect();
        assert_eq!(out, expected);
        assert!(gauge.peak() <= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn merge_keeps_per_source_order() {
        let merged = merge(vec![
            Stream::of([1, 2, 3]),
            Stream::of([10, 20]),
            Stream::of([100]),
        ]);
        let out = merged.to_list().run().await.unwrap();
        assert_eq!(out.len(), 6);
        let small: Vec<_> = out.iter().copied().filter(|n| *n < 10).collect();
        let mid: Vec<_> = out.iter().copied().filter(|n| (10..100).contains(n)).collect();
        assert_eq!(small, vec![1, 2, 3]);
        assert_eq!(mid, vec![10, 20]);

        assert_eq!(merge::<i32>(vec![]).to_list().run().await, Ok(vec![]));
        assert_eq!(
            Stream::of([1]).merge(Stream::empty()).to_list().run().await,
            Ok(vec![1])
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn merge_fails_fast() {
        let out = merge2(
            Stream::repeat(1).map_task(|n| {
                Task::from_future(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    Ok(n)
                })
            }),
            Stream::fail(StreamError::production("right side down")),
        )
        .to_list()
        .run()
        .await;
        assert_eq!(out, Err(StreamError::production("right side down")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn par_collect_keeps_order() {
        let out = Stream::of(1..=25)
            .par_collect(4)
            .unwrap()
            .run()
            .await;
        assert_eq!(out, Ok((1..=25).collect::<Vec<_>>()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn config_variants_validate() {
        let bad = ParallelConfig::new().with_concurrency(0);
        assert!(par_eval_map_with(Stream::of([1]), &bad, Task::pure).is_err());

        let config = ParallelConfig::new()
            .with_concurrency(2)
            .with_channel_capacity(1);
        let out = par_eval_flat_map_with(Stream::of([1, 2]), &config, |n| Stream::of([n, n]))
            .unwrap()
            .count()
            .run()
            .await;
        assert_eq!(out, Ok(4));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn fail_fast_is_logged() {
        let out = Stream::of(1..=3)
            .par_eval_map(2, |n| {
                if n == 2 {
                    Task::fail(StreamError::production("two"))
                } else {
                    Task::pure(n)
                }
            })
            .unwrap()
            .drain()
            .run()
            .await;
        assert_eq!(out, Err(StreamError::production("two")));
        assert!(logs_contain("cancelling the rest"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn retraversal_restarts_the_operation() {
        let stream = Stream::of(1..=3).par_eval_map(2, |n| Task::pure(n + 1)).unwrap();
        assert_eq!(stream.to_list().run().await, Ok(vec![2, 3, 4]));
        assert_eq!(stream.to_list().run().await, Ok(vec![2, 3, 4]));
    }
}
