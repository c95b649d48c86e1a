//! Iterative teardown of nested streams
//!
//! Every combinator closes over its source, so a chain of N combinators is N
//! nested `Arc`s. Dropping the outermost handle would recurse N levels deep.
//! Instead, the first drop on a thread becomes the owner of a thread-local
//! queue; nested stream drops that happen while the owner is releasing are
//! parked in the queue and dropped one at a time by the owner's loop.

use std::any::Any;
use std::cell::RefCell;

#[derive(Default)]
struct ReleaseQueue {
    draining: bool,
    pending: Vec<Box<dyn Any>>,
}

thread_local! {
    static RELEASE: RefCell<ReleaseQueue> = RefCell::new(ReleaseQueue::default());
}

/// Clears the draining flag even if a destructor panics.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        let _ = RELEASE.try_with(|queue| queue.borrow_mut().draining = false);
    }
}

/// Drop `value` without growing the stack across nested releases.
pub(crate) fn release<T: 'static>(value: T) {
    let mut slot = Some(value);
    let owner = RELEASE
        .try_with(|queue| {
            let mut queue = queue.borrow_mut();
            if queue.draining {
                if let Some(value) = slot.take() {
                    queue.pending.push(Box::new(value));
                }
                false
            } else {
                queue.draining = true;
                true
            }
        })
        .unwrap_or(false);

    if !owner {
        // Either parked for the owner, or thread-local storage is gone and
        // the value drops normally.
        drop(slot);
        return;
    }

    let _guard = DrainGuard;
    drop(slot);
    loop {
        let next = RELEASE
            .try_with(|queue| queue.borrow_mut().pending.pop())
            .ok()
            .flatten();
        match next {
            Some(parked) => drop(parked),
            None => break,
        }
    }
}
