//! Trampolined task evaluator
//!
//! A [`Task`](super::Task) is not a chain of nested futures but a small
//! instruction tree (`Op`). The evaluator walks that tree with an explicit,
//! heap-allocated continuation stack, so a task built from N nested `map`,
//! `and_then` or `defer` layers runs in constant native stack depth.
//!
//! Values travel through the loop type-erased as `Box<dyn Any + Send>`; the
//! typed `Task` API is the only producer of instructions, so every downcast in
//! a continuation matches the value pushed by its predecessor.

use std::any::Any;

use futures::future::BoxFuture;

use crate::error::{Result, StreamError};

pub(crate) type Value = Box<dyn Any + Send>;
pub(crate) type Outcome = std::result::Result<Value, StreamError>;

type MapFn = Box<dyn FnOnce(Value) -> Outcome + Send>;
type BindFn = Box<dyn FnOnce(Value) -> Op + Send>;
type HandleFn = Box<dyn FnOnce(StreamError) -> Op + Send>;

/// One instruction of a task program.
pub(crate) enum Op {
    Pure(Value),
    Fail(StreamError),
    /// Synchronous thunk, run when evaluation reaches it.
    Delay(Box<dyn FnOnce() -> Outcome + Send>),
    /// Produces the next instruction lazily; this is what keeps deep pulls flat.
    Defer(Box<dyn FnOnce() -> Op + Send>),
    /// Genuine suspension point.
    Future(BoxFuture<'static, Outcome>),
    Map(Box<Op>, MapFn),
    FlatMap(Box<Op>, BindFn),
    Recover(Box<Op>, HandleFn),
}

enum Frame {
    Map(MapFn),
    Bind(BindFn),
    Handle(HandleFn),
}

enum Unwound {
    Finished(Outcome),
    Continue(Op),
}

/// Run a task program to completion.
pub(crate) async fn evaluate(root: Op) -> Outcome {
    let mut frames: Vec<Frame> = Vec::new();
    let mut current = root;

    loop {
        let outcome = match current {
            Op::Pure(value) => Ok(value),
            Op::Fail(error) => Err(error),
            Op::Delay(thunk) => thunk(),
            Op::Future(future) => future.await,
            Op::Defer(thunk) => {
                current = thunk();
                continue;
            }
            Op::Map(inner, f) => {
                frames.push(Frame::Map(f));
                current = *inner;
                continue;
            }
            Op::FlatMap(inner, f) => {
                frames.push(Frame::Bind(f));
                current = *inner;
                continue;
            }
            Op::Recover(inner, handler) => {
                frames.push(Frame::Handle(handler));
                current = *inner;
                continue;
            }
        };

        match unwind(&mut frames, outcome) {
            Unwound::Finished(outcome) => return outcome,
            Unwound::Continue(next) => current = next,
        }
    }
}

/// Pop frames until one consumes the outcome and yields a new instruction.
///
/// Successes skip error handlers; failures skip map and bind frames.
fn unwind(frames: &mut Vec<Frame>, mut outcome: Outcome) -> Unwound {
    while let Some(frame) = frames.pop() {
        match (frame, outcome) {
            (Frame::Map(f), Ok(value)) => outcome = f(value),
            (Frame::Bind(f), Ok(value)) => return Unwound::Continue(f(value)),
            (Frame::Handle(handler), Err(error)) => return Unwound::Continue(handler(error)),
            (_, passthrough) => outcome = passthrough,
        }
    }
    Unwound::Finished(outcome)
}

pub(crate) fn erase<A: Send + 'static>(value: A) -> Value {
    Box::new(value)
}

pub(crate) fn downcast<A: 'static>(value: Value) -> Result<A> {
    value.downcast::<A>().map(|boxed| *boxed).map_err(|_| {
        StreamError::internal(format!(
            "task value is not a {}",
            std::any::type_name::<A>()
        ))
    })
}
