//! Stream combinators
//!
//! Each combinator wraps its source's pull in a new pull and re-wraps the
//! continuation it gets back. Sources are pulled through `deferred_pull`, which
//! keeps arbitrarily long combinator chains flat on the native stack.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use super::{Step, Stream};
use crate::error::Result;
use crate::task::Task;

impl<A: Send + 'static> Stream<A> {
    /// Transform every element.
    pub fn map<B, F>(self, f: F) -> Stream<B>
    where
        B: Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        map_with(self, Arc::new(f))
    }

    /// Transform every element with a fallible function. An `Err` fails the
    /// pull that produced the element.
    pub fn try_map<B, F>(self, f: F) -> Stream<B>
    where
        B: Send + 'static,
        F: Fn(A) -> Result<B> + Send + Sync + 'static,
    {
        try_map_with(self, Arc::new(f))
    }

    /// Transform every element with an asynchronous function, one at a time.
    pub fn map_task<B, F>(self, f: F) -> Stream<B>
    where
        B: Send + 'static,
        F: Fn(A) -> Task<B> + Send + Sync + 'static,
    {
        map_task_with(self, Arc::new(f))
    }

    /// Keep elements matching `predicate`; the rest become `Skip` steps.
    pub fn filter<P>(self, predicate: P) -> Self
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        filter_with(self, Arc::new(predicate))
    }

    /// Filter with a fallible predicate. An `Err` fails the pull.
    pub fn try_filter<P>(self, predicate: P) -> Self
    where
        P: Fn(&A) -> Result<bool> + Send + Sync + 'static,
    {
        self.try_map(move |value| Ok(predicate(&value)?.then_some(value)))
            .flatten_options()
    }

    /// Replace each element with a sub-stream and concatenate them.
    pub fn flat_map<B, F>(self, f: F) -> Stream<B>
    where
        B: Send + 'static,
        F: Fn(A) -> Stream<B> + Send + Sync + 'static,
    {
        flat_map_state(self, None, Arc::new(f))
    }

    /// At most the first `n` elements. `take(0)` never touches the source.
    pub fn take(self, n: usize) -> Self {
        if n == 0 {
            return Self::empty();
        }
        Self::from_pull(move || {
            self.deferred_pull().map(move |step| match step {
                Step::Emit(value, tail) => Step::Emit(value, tail.take(n - 1)),
                Step::Skip(tail) => Step::Skip(tail.take(n)),
                Step::Done => Step::Done,
            })
        })
    }

    /// Everything after the first `n` elements.
    pub fn drop(self, n: usize) -> Self {
        if n == 0 {
            return self;
        }
        Self::from_pull(move || {
            self.deferred_pull().map(move |step| match step {
                Step::Emit(_, tail) => Step::Skip(tail.drop(n - 1)),
                Step::Skip(tail) => Step::Skip(tail.drop(n)),
                Step::Done => Step::Done,
            })
        })
    }

    /// Elements while `predicate` holds; finishes at the first mismatch.
    pub fn take_while<P>(self, predicate: P) -> Self
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        take_while_with(self, Arc::new(predicate))
    }

    /// Skip elements while `predicate` holds, then pass everything through.
    pub fn drop_while<P>(self, predicate: P) -> Self
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        drop_while_with(self, Arc::new(predicate))
    }

    /// This stream followed by `other`.
    pub fn concat(self, other: Stream<A>) -> Self {
        Self::from_pull(move || {
            let other = other.clone();
            self.deferred_pull().map(move |step| match step {
                Step::Emit(value, tail) => Step::Emit(value, tail.concat(other)),
                Step::Skip(tail) => Step::Skip(tail.concat(other)),
                Step::Done => Step::Skip(other),
            })
        })
    }

    /// Alternate elements with `other`, continuing with whichever side remains.
    pub fn interleave(self, other: Stream<A>) -> Self {
        Self::from_pull(move || {
            let other = other.clone();
            self.deferred_pull().map(move |step| match step {
                Step::Emit(value, tail) => Step::Emit(value, other.interleave(tail)),
                Step::Skip(tail) => Step::Skip(other.interleave(tail)),
                Step::Done => Step::Skip(other),
            })
        })
    }

    /// Run `action` on each element as it passes.
    pub fn inspect<F>(self, action: F) -> Self
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let action = Arc::new(action);
        self.map(move |value| {
            action(&value);
            value
        })
    }

    /// Run `action` when the stream reports `Done`.
    pub fn on_complete<F>(self, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        on_complete_with(self, Arc::new(action))
    }

    /// Discard element values.
    pub fn as_unit(self) -> Stream<()> {
        self.map(|_| ())
    }
}

impl<A: Clone + Send + Sync + 'static> Stream<A> {
    /// Emit `value` before this stream.
    pub fn prepend(self, value: A) -> Self {
        Self::from_pull(move || Task::pure(Step::Emit(value.clone(), self.clone())))
    }

    /// Emit `value` after this stream.
    pub fn append(self, value: A) -> Self {
        self.concat(Stream::once(value))
    }

    /// Pair elements positionally; finishes with the shorter side.
    pub fn zip_with<B, C, F>(self, other: Stream<B>, combine: F) -> Stream<C>
    where
        B: Send + 'static,
        C: Send + 'static,
        F: Fn(A, B) -> C + Send + Sync + 'static,
    {
        zip_state(self, other, None, Arc::new(combine))
    }
}

impl<A: Clone + Eq + Hash + Send + Sync + 'static> Stream<A> {
    /// Drop elements already seen in this traversal.
    ///
    /// The seen-set is created on the first pull of each traversal and is the
    /// only cross-pull state among the sequential combinators. It grows with
    /// every distinct element, so on an unbounded source memory is unbounded.
    pub fn distinct(self) -> Self {
        Stream::defer(move || {
            let seen = Mutex::new(HashSet::new());
            self.clone().filter(move |value| {
                let mut seen = match seen.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                seen.insert(value.clone())
            })
        })
    }
}

impl<A: Send + 'static> Stream<Option<A>> {
    /// Unwrap `Some` elements and skip `None`s.
    pub fn flatten_options(self) -> Stream<A> {
        Stream::from_pull(move || {
            self.deferred_pull().map(|step| match step {
                Step::Emit(Some(value), tail) => Step::Emit(value, tail.flatten_options()),
                Step::Emit(None, tail) | Step::Skip(tail) => Step::Skip(tail.flatten_options()),
                Step::Done => Step::Done,
            })
        })
    }
}

fn map_with<A, B, F>(source: Stream<A>, f: Arc<F>) -> Stream<B>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> B + Send + Sync + 'static,
{
    Stream::from_pull(move || {
        let f = f.clone();
        source.deferred_pull().map(move |step| match step {
            Step::Emit(value, tail) => {
                let mapped = f(value);
                Step::Emit(mapped, map_with(tail, f))
            }
            Step::Skip(tail) => Step::Skip(map_with(tail, f)),
            Step::Done => Step::Done,
        })
    })
}

fn try_map_with<A, B, F>(source: Stream<A>, f: Arc<F>) -> Stream<B>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Result<B> + Send + Sync + 'static,
{
    Stream::from_pull(move || {
        let f = f.clone();
        source.deferred_pull().try_map(move |step| {
            Ok(match step {
                Step::Emit(value, tail) => {
                    let mapped = f(value)?;
                    Step::Emit(mapped, try_map_with(tail, f))
                }
                Step::Skip(tail) => Step::Skip(try_map_with(tail, f)),
                Step::Done => Step::Done,
            })
        })
    })
}

fn map_task_with<A, B, F>(source: Stream<A>, f: Arc<F>) -> Stream<B>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Task<B> + Send + Sync + 'static,
{
    Stream::from_pull(move || {
        let f = f.clone();
        source.deferred_pull().and_then(move |step| match step {
            Step::Emit(value, tail) => {
                let task = f(value);
                task.map(move |mapped| Step::Emit(mapped, map_task_with(tail, f)))
            }
            Step::Skip(tail) => Task::pure(Step::Skip(map_task_with(tail, f))),
            Step::Done => Task::pure(Step::Done),
        })
    })
}

fn filter_with<A, P>(source: Stream<A>, predicate: Arc<P>) -> Stream<A>
where
    A: Send + 'static,
    P: Fn(&A) -> bool + Send + Sync + 'static,
{
    Stream::from_pull(move || {
        let predicate = predicate.clone();
        source.deferred_pull().map(move |step| match step {
            Step::Emit(value, tail) => {
                if predicate(&value) {
                    Step::Emit(value, filter_with(tail, predicate))
                } else {
                    Step::Skip(filter_with(tail, predicate))
                }
            }
            Step::Skip(tail) => Step::Skip(filter_with(tail, predicate)),
            Step::Done => Step::Done,
        })
    })
}

/// `flat_map` as an explicit two-state machine: draining `inner`, or pulling
/// `outer` for the next sub-stream when there is none. Moving between the two
/// states happens inside the same pull, sequenced through the task run loop,
/// so an element travels through N stacked flat maps in a single pull.
fn flat_map_state<A, B, F>(outer: Stream<A>, inner: Option<Stream<B>>, f: Arc<F>) -> Stream<B>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Stream<B> + Send + Sync + 'static,
{
    Stream::from_pull(move || match &inner {
        Some(active) => drain_inner(active, outer.clone(), f.clone()),
        None => next_outer(&outer, f.clone()),
    })
}

fn drain_inner<A, B, F>(active: &Stream<B>, outer: Stream<A>, f: Arc<F>) -> Task<Step<B>>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Stream<B> + Send + Sync + 'static,
{
    active.deferred_pull().and_then(move |step| match step {
        Step::Emit(value, rest) => {
            Task::pure(Step::Emit(value, flat_map_state(outer, Some(rest), f)))
        }
        Step::Skip(rest) => Task::pure(Step::Skip(flat_map_state(outer, Some(rest), f))),
        Step::Done => next_outer(&outer, f),
    })
}

fn next_outer<A, B, F>(outer: &Stream<A>, f: Arc<F>) -> Task<Step<B>>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Stream<B> + Send + Sync + 'static,
{
    outer.deferred_pull().and_then(move |step| match step {
        Step::Emit(value, rest) => {
            let inner = f(value);
            drain_inner(&inner, rest, f)
        }
        Step::Skip(rest) => Task::pure(Step::Skip(flat_map_state(rest, None, f))),
        Step::Done => Task::pure(Step::Done),
    })
}

fn take_while_with<A, P>(source: Stream<A>, predicate: Arc<P>) -> Stream<A>
where
    A: Send + 'static,
    P: Fn(&A) -> bool + Send + Sync + 'static,
{
    Stream::from_pull(move || {
        let predicate = predicate.clone();
        source.deferred_pull().map(move |step| match step {
            Step::Emit(value, tail) if predicate(&value) => {
                Step::Emit(value, take_while_with(tail, predicate))
            }
            Step::Emit(..) | Step::Done => Step::Done,
            Step::Skip(tail) => Step::Skip(take_while_with(tail, predicate)),
        })
    })
}

fn drop_while_with<A, P>(source: Stream<A>, predicate: Arc<P>) -> Stream<A>
where
    A: Send + 'static,
    P: Fn(&A) -> bool + Send + Sync + 'static,
{
    Stream::from_pull(move || {
        let predicate = predicate.clone();
        source.deferred_pull().map(move |step| match step {
            Step::Emit(value, tail) if predicate(&value) => {
                Step::Skip(drop_while_with(tail, predicate))
            }
            Step::Emit(value, tail) => Step::Emit(value, tail),
            Step::Skip(tail) => Step::Skip(drop_while_with(tail, predicate)),
            Step::Done => Step::Done,
        })
    })
}

fn on_complete_with<A, F>(source: Stream<A>, action: Arc<F>) -> Stream<A>
where
    A: Send + 'static,
    F: Fn() + Send + Sync + 'static,
{
    Stream::from_pull(move || {
        let action = action.clone();
        source.deferred_pull().map(move |step| match step {
            Step::Emit(value, tail) => Step::Emit(value, on_complete_with(tail, action)),
            Step::Skip(tail) => Step::Skip(on_complete_with(tail, action)),
            Step::Done => {
                action();
                Step::Done
            }
        })
    })
}

/// Zip state: `pending` holds a left element waiting for its right partner,
/// so skips on either side never lose or duplicate an element.
fn zip_state<A, B, C, F>(
    left: Stream<A>,
    right: Stream<B>,
    pending: Option<A>,
    combine: Arc<F>,
) -> Stream<C>
where
    A: Clone + Send + Sync + 'static,
    B: Send + 'static,
    C: Send + 'static,
    F: Fn(A, B) -> C + Send + Sync + 'static,
{
    Stream::from_pull(move || {
        let combine = combine.clone();
        match &pending {
            None => {
                let right = right.clone();
                left.deferred_pull().map(move |step| match step {
                    Step::Emit(value, rest) => {
                        Step::Skip(zip_state(rest, right, Some(value), combine))
                    }
                    Step::Skip(rest) => Step::Skip(zip_state(rest, right, None, combine)),
                    Step::Done => Step::Done,
                })
            }
            Some(value) => {
                let left = left.clone();
                let value = value.clone();
                right.deferred_pull().map(move |step| match step {
                    Step::Emit(partner, rest) => {
                        let combined = combine(value, partner);
                        Step::Emit(combined, zip_state(left, rest, None, combine))
                    }
                    Step::Skip(rest) => Step::Skip(zip_state(left, rest, Some(value), combine)),
                    Step::Done => Step::Done,
                })
            }
        }
    })
}
