//! Sliding concurrency window
//!
//! Drives `par_eval_map` and `par_eval_map_unordered`. Source elements are
//! pulled and dispatched as units while the window has room; results are
//! emitted in source order (ordered) or as they complete (unordered).

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::pump::Pump;
use super::scope::TaskScope;
use crate::error::{Result, StreamError};
use crate::stream::{Step, Stream};
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Emission {
    SourceOrder,
    CompletionOrder,
}

pub(crate) struct Window<A: Send + 'static, B, F> {
    source: Option<Stream<A>>,
    f: Arc<F>,
    limit: usize,
    emission: Emission,
    scope: TaskScope<(u64, B)>,
    next_admit: u64,
    next_emit: u64,
    // Results that finished ahead of the window head.
    completed: BTreeMap<u64, B>,
    failure: Option<StreamError>,
}

impl<A, B, F> Window<A, B, F>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Task<B> + Send + Sync + 'static,
{
    pub(crate) fn new(source: Stream<A>, limit: usize, emission: Emission, f: Arc<F>) -> Self {
        tracing::debug!(limit, ?emission, "parallel window opened");
        Self {
            source: Some(source),
            f,
            limit,
            emission,
            scope: TaskScope::new("par_eval_map"),
            next_admit: 0,
            next_emit: 0,
            completed: BTreeMap::new(),
            failure: None,
        }
    }

    /// Dispatched-but-unemitted positions stay within the limit. In source
    /// order this counts finished results still waiting for the head, so the
    /// in-flight count is bounded either way.
    fn has_room(&self) -> bool {
        match self.emission {
            Emission::SourceOrder => self.next_admit - self.next_emit < self.limit as u64,
            Emission::CompletionOrder => self.scope.len() < self.limit,
        }
    }

    /// Pull the source until one element is dispatched or the source ends.
    async fn admit(&mut self) -> Result<()> {
        while let Some(source) = self.source.take() {
            match source.pull().run().await? {
                Step::Emit(value, tail) => {
                    let index = self.next_admit;
                    self.next_admit += 1;
                    let f = self.f.clone();
                    self.scope
                        .spawn(async move { f(value).run().await.map(|out| (index, out)) });
                    tracing::trace!(index, in_flight = self.scope.len(), "unit dispatched");
                    self.source = Some(tail);
                    return Ok(());
                }
                Step::Skip(tail) => self.source = Some(tail),
                Step::Done => tracing::trace!(admitted = self.next_admit, "window source exhausted"),
            }
        }
        Ok(())
    }

    fn fail(&mut self, error: StreamError) -> StreamError {
        tracing::warn!(
            error = %error,
            in_flight = self.scope.len(),
            "parallel unit failed, cancelling the rest"
        );
        self.scope.close();
        self.completed.clear();
        self.source = None;
        self.failure = Some(error.clone());
        error
    }

    async fn advance(&mut self) -> Result<Option<B>> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        loop {
            if let Some(ready) = self.completed.remove(&self.next_emit) {
                self.next_emit += 1;
                return Ok(Some(ready));
            }

            while self.source.is_some() && self.has_room() {
                if let Err(error) = self.admit().await {
                    return Err(self.fail(error));
                }
            }

            match self.scope.join_next().await {
                Some(Ok((index, out))) => match self.emission {
                    Emission::SourceOrder => {
                        self.completed.insert(index, out);
                    }
                    Emission::CompletionOrder => {
                        self.next_emit += 1;
                        return Ok(Some(out));
                    }
                },
                Some(Err(error)) => return Err(self.fail(error)),
                None => {
                    tracing::debug!(emitted = self.next_emit, "parallel window drained");
                    return Ok(None);
                }
            }
        }
    }
}

impl<A, B, F> Pump<B> for Window<A, B, F>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> Task<B> + Send + Sync + 'static,
{
    fn next(&mut self) -> BoxFuture<'_, Result<Option<B>>> {
        self.advance().boxed()
    }
}
