//! Stream factories
//!
//! Every other factory can be expressed through [`Stream::unfold`]; the
//! dedicated ones avoid the extra task per element.

use std::sync::{Arc, Mutex};

use super::{Step, Stream};
use crate::error::StreamError;
use crate::task::Task;

impl<A: Send + 'static> Stream<A> {
    /// A stream with no elements.
    pub fn empty() -> Self {
        Self::from_pull(|| Task::pure(Step::Done))
    }

    /// A stream whose first pull fails with `error`.
    pub fn fail(error: StreamError) -> Self {
        Self::from_pull(move || Task::fail(error.clone()))
    }

    /// Elements drawn from an iterator.
    ///
    /// Single-use: the iterator is shared by every handle, so a second
    /// traversal sees only what the first one left behind. Pulling after the
    /// iterator is exhausted keeps returning `Done`.
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = A>,
        I::IntoIter: Send + 'static,
    {
        iterator_stream(Arc::new(Mutex::new(items.into_iter())))
    }

    /// Elements produced by calling `supplier` once per pull. Infinite.
    pub fn generate<F>(supplier: F) -> Self
    where
        F: Fn() -> A + Send + Sync + 'static,
    {
        generate_with(Arc::new(supplier))
    }
}

impl<A: Clone + Send + Sync + 'static> Stream<A> {
    /// A single-element stream.
    pub fn once(value: A) -> Self {
        Self::from_pull(move || Task::pure(Step::Emit(value.clone(), Stream::empty())))
    }

    /// Alias of [`Stream::once`].
    pub fn succeed(value: A) -> Self {
        Self::once(value)
    }

    /// A finite stream of the given values, in order.
    pub fn of<I>(values: I) -> Self
    where
        I: IntoIterator<Item = A>,
    {
        Self::from_collection(values.into_iter().collect::<Vec<_>>())
    }

    /// Elements of a shared collection.
    ///
    /// The collection is held behind an `Arc` and read by index, so building
    /// and re-traversing the stream never copies it.
    pub fn from_collection(items: impl Into<Arc<[A]>>) -> Self {
        collection_at(items.into(), 0)
    }

    /// `seed, f(seed), f(f(seed)), ...`. Infinite.
    pub fn iterate<F>(seed: A, f: F) -> Self
    where
        F: Fn(&A) -> A + Send + Sync + 'static,
    {
        iterate_with(seed, Arc::new(f))
    }

    /// The same value forever.
    pub fn repeat(value: A) -> Self {
        Self::from_pull(move || {
            let value = value.clone();
            Task::delay(move || Step::Emit(value.clone(), Stream::repeat(value)))
        })
    }
}

impl<A: Send + 'static> Stream<A> {
    /// The most general factory: `step(state)` yields the next element and
    /// state, or `None` to finish.
    pub fn unfold<S, F>(initial: S, step: F) -> Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(S) -> Task<Option<(A, S)>> + Send + Sync + 'static,
    {
        unfold_with(initial, Arc::new(step))
    }
}

impl Stream<i64> {
    /// Integers in `start..end`.
    pub fn range(start: i64, end: i64) -> Self {
        if start >= end {
            return Self::empty();
        }
        Self::from_pull(move || Task::pure(Step::Emit(start, Stream::range(start + 1, end))))
    }
}

fn collection_at<A>(items: Arc<[A]>, index: usize) -> Stream<A>
where
    A: Clone + Send + Sync + 'static,
{
    Stream::from_pull(move || match items.get(index) {
        Some(item) => Task::pure(Step::Emit(
            item.clone(),
            collection_at(items.clone(), index + 1),
        )),
        None => Task::pure(Step::Done),
    })
}

fn iterator_stream<A, I>(iter: Arc<Mutex<I>>) -> Stream<A>
where
    A: Send + 'static,
    I: Iterator<Item = A> + Send + 'static,
{
    Stream::from_pull(move || {
        let iter = iter.clone();
        Task::of(move || {
            let next = iter
                .lock()
                .map_err(|_| StreamError::production("source iterator lock poisoned"))?
                .next();
            Ok(match next {
                Some(value) => Step::Emit(value, iterator_stream(iter)),
                None => Step::Done,
            })
        })
    })
}

fn generate_with<A, F>(supplier: Arc<F>) -> Stream<A>
where
    A: Send + 'static,
    F: Fn() -> A + Send + Sync + 'static,
{
    Stream::from_pull(move || {
        let supplier = supplier.clone();
        Task::delay(move || Step::Emit(supplier(), generate_with(supplier)))
    })
}

fn iterate_with<A, F>(seed: A, f: Arc<F>) -> Stream<A>
where
    A: Clone + Send + Sync + 'static,
    F: Fn(&A) -> A + Send + Sync + 'static,
{
    Stream::from_pull(move || {
        let seed = seed.clone();
        let f = f.clone();
        Task::delay(move || {
            let next = f(&seed);
            Step::Emit(seed, iterate_with(next, f))
        })
    })
}

fn unfold_with<A, S, F>(state: S, step: Arc<F>) -> Stream<A>
where
    A: Send + 'static,
    S: Clone + Send + Sync + 'static,
    F: Fn(S) -> Task<Option<(A, S)>> + Send + Sync + 'static,
{
    Stream::from_pull(move || {
        let next = step.clone();
        step(state.clone()).map(move |produced| match produced {
            Some((value, state)) => Step::Emit(value, unfold_with(state, next)),
            None => Step::Done,
        })
    })
}
