//! Bounded pool the export adapters submit storage calls to.
//!
//! Each submission becomes a tokio task that first takes a permit from a
//! shared semaphore, so at most `size` storage calls are in flight. Callers
//! get an [`ExportTask`] back immediately and await it when they need the
//! result.

use crate::errors::{ExportError, ExportResult};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::{sync::Semaphore, task::JoinHandle};
use tracing::warn;

pub const DEFAULT_WORKERS: usize = 4;

#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Pool allowing `size` concurrent tasks (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `task` on the pool. Must be called from within a tokio runtime.
    pub fn submit<F, T>(&self, task: F) -> ExportTask<T>
    where
        F: Future<Output = ExportResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|err| ExportError::Worker(err.to_string()))?;
            task.await
        });
        ExportTask { handle }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

/// Handle to a submitted storage call.
///
/// Resolves to the call's result; a panicked or aborted task resolves to
/// [`ExportError::Worker`].
#[must_use = "export tasks do nothing observable unless awaited"]
pub struct ExportTask<T> {
    handle: JoinHandle<ExportResult<T>>,
}

impl<T> Future for ExportTask<T> {
    type Output = ExportResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) => {
                warn!(error = %err, "export task did not complete");
                Poll::Ready(Err(ExportError::Worker(err.to_string())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
