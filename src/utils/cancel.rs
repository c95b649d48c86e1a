//! Cancellation utilities
//!
//! Provides first-class cancellation handles for streams and long-running
//! operations. The parallel engine's scopes are built on the same handle.

use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::stream::{Step, Stream};
use crate::task::Task;

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Pulls and units observing this handle stop at
    /// their next suspension point.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that resolves when cancellation is requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// A handle cancelled together with this one, but cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Make a stream cancellable and return its cancel handle.
///
/// Once cancelled, a pending pull is abandoned and every later pull fails
/// with [`StreamError::Cancelled`].
pub fn make_cancellable_stream<A: Send + 'static>(stream: Stream<A>) -> (Stream<A>, CancelHandle) {
    let handle = CancelHandle::new();
    (guarded(stream, handle.token()), handle)
}

/// Create a standalone cancel handle that can be shared across tasks.
pub fn new_cancel_handle() -> CancelHandle {
    CancelHandle::new()
}

fn guarded<A: Send + 'static>(source: Stream<A>, token: CancellationToken) -> Stream<A> {
    Stream::from_pull(move || {
        let source = source.clone();
        let token = token.clone();
        Task::from_future(async move {
            if token.is_cancelled() {
                return Err(StreamError::cancelled("stream cancelled"));
            }
            let step = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(StreamError::cancelled("stream cancelled")),
                step = source.pull().run() => step?,
            };
            Ok(match step {
                Step::Emit(value, tail) => Step::Emit(value, guarded(tail, token)),
                Step::Skip(tail) => Step::Skip(guarded(tail, token)),
                Step::Done => Step::Done,
            })
        })
    })
}

impl<A: Send + 'static> Stream<A> {
    /// See [`make_cancellable_stream`].
    pub fn cancellable(self) -> (Self, CancelHandle) {
        make_cancellable_stream(self)
    }
}
