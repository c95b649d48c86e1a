//! Adapting stateful engines to the pull interface
//!
//! The parallel engines keep mutable state (a scope, buffers, a channel)
//! across pulls. A [`Pump`] owns that state and the resulting stream hands
//! every pull to it in turn.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::stream::{Step, Stream};
use crate::task::Task;

pub(crate) trait Pump<B>: Send {
    /// The next output element, or `None` once the engine is exhausted.
    fn next(&mut self) -> BoxFuture<'_, Result<Option<B>>>;
}

/// A stream that creates a fresh pump for every traversal from its head.
///
/// Within one traversal the pump is shared by every continuation, so the
/// output is consumed rather than replayed; the engine is dropped, cancelling
/// its in-flight work, once the last continuation is gone.
pub(crate) fn pumped<B, P, F>(make_pump: F) -> Stream<B>
where
    B: Send + 'static,
    P: Pump<B> + 'static,
    F: Fn() -> P + Send + Sync + 'static,
{
    Stream::defer(move || drain_pump(Arc::new(Mutex::new(make_pump()))))
}

fn drain_pump<B, P>(pump: Arc<Mutex<P>>) -> Stream<B>
where
    B: Send + 'static,
    P: Pump<B> + 'static,
{
    Stream::from_pull(move || {
        let pump = pump.clone();
        Task::from_future(async move {
            let next = {
                let mut engine = pump.lock().await;
                engine.next().await?
            };
            Ok(match next {
                Some(value) => Step::Emit(value, drain_pump(pump)),
                None => Step::Done,
            })
        })
    })
}
