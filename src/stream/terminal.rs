//! Terminal operations
//!
//! Terminals consume a stream and return a lazy [`Task`]. Each one is a fold
//! over [`drive`], which pulls in a loop: `Skip` replaces the current stream
//! and loops, so long runs of skips or millions of elements run in constant
//! stack depth. Any failed pull fails the whole operation.

use std::ops::ControlFlow;

use super::{Step, Stream};
use crate::error::Result;
use crate::task::Task;

/// Pull `stream` to the end, threading `state` through `step`.
///
/// `step` may break early, in which case no further pull happens.
fn drive<A, S, R, F, G>(stream: &Stream<A>, init: S, mut step: F, finish: G) -> Task<R>
where
    A: Send + 'static,
    S: Send + 'static,
    R: Send + 'static,
    F: FnMut(S, A) -> ControlFlow<R, S> + Send + 'static,
    G: FnOnce(S) -> R + Send + 'static,
{
    let start = stream.clone();
    Task::from_future(async move {
        let mut current = start;
        let mut state = init;
        loop {
            match current.pull().run().await? {
                Step::Emit(value, tail) => match step(state, value) {
                    ControlFlow::Continue(next) => {
                        state = next;
                        current = tail;
                    }
                    ControlFlow::Break(result) => return Ok(result),
                },
                Step::Skip(tail) => current = tail,
                Step::Done => return Ok(finish(state)),
            }
        }
    })
}

impl<A: Send + 'static> Stream<A> {
    /// Collect every element, in order.
    pub fn to_list(&self) -> Task<Vec<A>> {
        drive(
            self,
            Vec::new(),
            |mut acc, value| {
                acc.push(value);
                ControlFlow::Continue(acc)
            },
            |acc| acc,
        )
    }

    /// Combine all elements with an associative `op` starting from `identity`.
    pub fn fold<F>(&self, identity: A, op: F) -> Task<A>
    where
        F: Fn(A, A) -> A + Send + 'static,
    {
        self.fold_left(identity, op)
    }

    /// Left fold with an accumulator of a different type.
    pub fn fold_left<B, F>(&self, initial: B, op: F) -> Task<B>
    where
        B: Send + 'static,
        F: Fn(B, A) -> B + Send + 'static,
    {
        drive(
            self,
            initial,
            move |acc, value| ControlFlow::Continue(op(acc, value)),
            |acc| acc,
        )
    }

    /// Number of elements.
    pub fn count(&self) -> Task<u64> {
        drive(self, 0u64, |n, _| ControlFlow::Continue(n + 1), |n| n)
    }

    /// The first element. Stops pulling after it.
    pub fn head_option(&self) -> Task<Option<A>> {
        drive(
            self,
            (),
            |(), value| ControlFlow::Break(Some(value)),
            |()| None,
        )
    }

    /// The last element. Consumes the whole stream.
    pub fn last_option(&self) -> Task<Option<A>> {
        drive(
            self,
            None,
            |_, value| ControlFlow::Continue(Some(value)),
            |last| last,
        )
    }

    /// Whether any element matches. Stops at the first match.
    pub fn exists<P>(&self, predicate: P) -> Task<bool>
    where
        P: Fn(&A) -> bool + Send + 'static,
    {
        drive(
            self,
            (),
            move |(), value| {
                if predicate(&value) {
                    ControlFlow::Break(true)
                } else {
                    ControlFlow::Continue(())
                }
            },
            |()| false,
        )
    }

    /// Whether every element matches. Stops at the first mismatch.
    pub fn for_all<P>(&self, predicate: P) -> Task<bool>
    where
        P: Fn(&A) -> bool + Send + 'static,
    {
        self.exists(move |value| !predicate(value)).map(|found| !found)
    }

    /// The first matching element.
    pub fn find<P>(&self, predicate: P) -> Task<Option<A>>
    where
        P: Fn(&A) -> bool + Send + 'static,
    {
        drive(
            self,
            (),
            move |(), value| {
                if predicate(&value) {
                    ControlFlow::Break(Some(value))
                } else {
                    ControlFlow::Continue(())
                }
            },
            |()| None,
        )
    }

    /// Run `action` on every element.
    pub fn for_each<F>(&self, mut action: F) -> Task<()>
    where
        F: FnMut(A) + Send + 'static,
    {
        drive(
            self,
            (),
            move |(), value| {
                action(value);
                ControlFlow::Continue(())
            },
            |()| (),
        )
    }

    /// Pull every element for its effects and discard it.
    pub fn drain(&self) -> Task<()> {
        drive(self, (), |(), _| ControlFlow::Continue(()), |()| ())
    }

    /// Collect, capturing a failure as a value instead of failing the task.
    pub fn run_safe(&self) -> Task<Result<Vec<A>>> {
        self.to_list().attempt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted(pulls: Arc<AtomicUsize>) -> Stream<usize> {
        Stream::generate(move || pulls.fetch_add(1, Ordering::SeqCst) + 1)
    }

    #[tokio::test]
    async fn folds() {
        let s = Stream::of(1..=4);
        assert_eq!(s.fold(0, |a, b| a + b).run().await, Ok(10));
        assert_eq!(
            s.fold_left(String::new(), |acc, n| format!("{acc}{n}"))
                .run()
                .await,
            Ok("1234".to_string())
        );
        assert_eq!(s.count().run().await, Ok(4));
    }

    #[tokio::test]
    async fn head_and_last() {
        let s = Stream::of(["a", "b", "c"]);
        assert_eq!(s.head_option().run().await, Ok(Some("a")));
        assert_eq!(s.last_option().run().await, Ok(Some("c")));
        assert_eq!(Stream::<u8>::empty().last_option().run().await, Ok(None));
    }

    #[tokio::test]
    async fn exists_short_circuits_on_infinite_stream() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let found = counted(pulls.clone()).exists(|n| *n == 3).run().await;
        assert_eq!(found, Ok(true));
        assert_eq!(pulls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn for_all_and_find_stop_early() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let all_small = counted(pulls.clone()).for_all(|n| *n < 5).run().await;
        assert_eq!(all_small, Ok(false));
        assert_eq!(pulls.load(Ordering::SeqCst), 5);

        let s = Stream::of(1..=10);
        assert_eq!(s.find(|n| n % 4 == 0).run().await, Ok(Some(4)));
        assert_eq!(s.find(|n| *n > 10).run().await, Ok(None));
    }

    #[tokio::test]
    async fn for_each_and_drain_run_effects() {
        let total = Arc::new(AtomicUsize::new(0));
        let t = total.clone();
        Stream::of(1..=3usize)
            .for_each(move |n| {
                t.fetch_add(n, Ordering::SeqCst);
            })
            .run()
            .await
            .unwrap();
        assert_eq!(total.load(Ordering::SeqCst), 6);

        let pulls = Arc::new(AtomicUsize::new(0));
        counted(pulls.clone()).take(7).drain().run().await.unwrap();
        assert_eq!(pulls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn failure_discards_partial_result() {
        let s = Stream::of(1..=3).concat(Stream::fail(StreamError::production("late")));
        assert_eq!(
            s.to_list().run().await,
            Err(StreamError::production("late"))
        );
        assert_eq!(
            s.run_safe().run().await,
            Ok(Err(StreamError::production("late")))
        );
    }

    #[tokio::test]
    async fn terminals_are_lazy() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let task = counted(pulls.clone()).take(2).to_list();
        assert_eq!(pulls.load(Ordering::SeqCst), 0);
        assert_eq!(task.run().await, Ok(vec![1, 2]));
    }
}
