//! Fan-in of concurrently driven sub-streams
//!
//! Drives `merge` and `par_eval_flat_map`. Each active sub-stream gets its own
//! producer unit that pulls it to the end and forwards elements over a bounded
//! channel; the consumer admits new sub-streams as earlier ones finish.

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use super::pump::Pump;
use super::scope::TaskScope;
use crate::error::{Result, StreamError};
use crate::stream::{Step, Stream};

enum Signal<B> {
    Element(B),
    SourceDone,
    SourceFailed(StreamError),
}

enum Event<B> {
    Signal(Option<Signal<B>>),
    Exited(Result<()>),
}

pub(crate) struct FanIn<B: Send + 'static> {
    sources: Option<Stream<Stream<B>>>,
    limit: usize,
    active: usize,
    sender: mpsc::Sender<Signal<B>>,
    signals: mpsc::Receiver<Signal<B>>,
    scope: TaskScope<()>,
    failure: Option<StreamError>,
}

impl<B: Send + 'static> FanIn<B> {
    pub(crate) fn new(sources: Stream<Stream<B>>, limit: usize, channel_capacity: usize) -> Self {
        tracing::debug!(limit, channel_capacity, "fan-in opened");
        let (sender, signals) = mpsc::channel(channel_capacity);
        Self {
            sources: Some(sources),
            limit,
            active: 0,
            sender,
            signals,
            scope: TaskScope::new("fan_in"),
            failure: None,
        }
    }

    /// Pull the outer stream until one sub-stream is started or it ends.
    async fn admit(&mut self) -> Result<()> {
        while let Some(sources) = self.sources.take() {
            match sources.pull().run().await? {
                Step::Emit(sub, tail) => {
                    self.scope.spawn(produce(sub, self.sender.clone()));
                    self.active += 1;
                    tracing::trace!(active = self.active, "sub-stream started");
                    self.sources = Some(tail);
                    return Ok(());
                }
                Step::Skip(tail) => self.sources = Some(tail),
                Step::Done => {}
            }
        }
        Ok(())
    }

    fn fail(&mut self, error: StreamError) -> StreamError {
        tracing::warn!(
            error = %error,
            active = self.active,
            "sub-stream failed, cancelling the rest"
        );
        self.scope.close();
        self.sources = None;
        self.active = 0;
        self.failure = Some(error.clone());
        error
    }

    async fn advance(&mut self) -> Result<Option<B>> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        loop {
            while self.sources.is_some() && self.active < self.limit {
                if let Err(error) = self.admit().await {
                    return Err(self.fail(error));
                }
            }
            if self.active == 0 {
                tracing::debug!("fan-in drained");
                return Ok(None);
            }

            let event = tokio::select! {
                signal = self.signals.recv() => Event::Signal(signal),
                Some(exited) = self.scope.join_next() => Event::Exited(exited),
            };

            match event {
                Event::Signal(Some(Signal::Element(value))) => return Ok(Some(value)),
                Event::Signal(Some(Signal::SourceDone)) => self.active -= 1,
                Event::Signal(Some(Signal::SourceFailed(error))) => return Err(self.fail(error)),
                Event::Signal(None) => {
                    return Err(self.fail(StreamError::internal("fan-in channel closed")));
                }
                // Producers report through the channel; only abnormal exits matter here.
                Event::Exited(Ok(())) => {}
                Event::Exited(Err(error)) => return Err(self.fail(error)),
            }
        }
    }
}

impl<B: Send + 'static> Pump<B> for FanIn<B> {
    fn next(&mut self) -> BoxFuture<'_, Result<Option<B>>> {
        self.advance().boxed()
    }
}

/// Pull `source` to the end, forwarding each element. Stops quietly when
/// the consumer side is gone.
async fn produce<B: Send + 'static>(source: Stream<B>, sender: mpsc::Sender<Signal<B>>) -> Result<()> {
    let mut current = source;
    loop {
        match current.pull().run().await {
            Ok(Step::Emit(value, tail)) => {
                if sender.send(Signal::Element(value)).await.is_err() {
                    return Ok(());
                }
                current = tail;
            }
            Ok(Step::Skip(tail)) => current = tail,
            Ok(Step::Done) => {
                let _ = sender.send(Signal::SourceDone).await;
                return Ok(());
            }
            Err(error) => {
                let _ = sender.send(Signal::SourceFailed(error)).await;
                return Ok(());
            }
        }
    }
}
