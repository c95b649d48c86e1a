//! Structured scope for the units of one parallel operation
//!
//! Every unit is spawned into the scope's `JoinSet` and raced against the
//! scope's cancellation token. Closing or dropping the scope cancels the token
//! and aborts whatever is still running, so no unit outlives its operation.

use std::future::Future;

use tokio::task::JoinSet;

use crate::error::{Result, StreamError};
use crate::utils::cancel::CancelHandle;

pub(crate) struct TaskScope<T> {
    units: JoinSet<Result<T>>,
    cancel: CancelHandle,
    operation: &'static str,
}

impl<T: Send + 'static> TaskScope<T> {
    pub(crate) fn new(operation: &'static str) -> Self {
        Self {
            units: JoinSet::new(),
            cancel: CancelHandle::default(),
            operation,
        }
    }

    /// Spawn a unit. Must be called within a tokio runtime.
    pub(crate) fn spawn<F>(&mut self, unit: F)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let token = self.cancel.token();
        let operation = self.operation;
        self.units.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(StreamError::cancelled(format!("{operation} scope closed"))),
                outcome = unit => outcome,
            }
        });
    }

    /// Units spawned and not yet joined.
    pub(crate) fn len(&self) -> usize {
        self.units.len()
    }

    /// The next unit to finish, or `None` when the scope is empty.
    ///
    /// Panics and aborts are reported as errors.
    pub(crate) async fn join_next(&mut self) -> Option<Result<T>> {
        let joined = self.units.join_next().await?;
        Some(joined.map_err(StreamError::from).and_then(|outcome| outcome))
    }

    /// Cancel every running unit.
    pub(crate) fn close(&mut self) {
        if !self.units.is_empty() {
            tracing::debug!(
                operation = self.operation,
                in_flight = self.units.len(),
                "cancelling in-flight units"
            );
        }
        self.cancel.cancel();
        self.units.abort_all();
    }
}

impl<T> Drop for TaskScope<T> {
    fn drop(&mut self) {
        // The JoinSet aborts its own tasks when dropped.
        self.cancel.cancel();
    }
}
