//! Detached background work.
//!
//! Cache refreshes run here so the response path never waits on them.
//! Failures are logged at debug level and dropped. Nothing is ever
//! cancelled: when the last handle goes away, tasks still running are
//! detached and run to completion on the runtime.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use waystation_core::Error;

/// Shared pool of fire-and-forget tasks.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `task` without waiting for it.
    ///
    /// Finished tasks are reaped on each call so the set does not grow
    /// with completed work.
    pub async fn spawn<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let mut set = self.inner.lock().await;
        while let Some(finished) = set.try_join_next() {
            log_join(finished);
        }
        set.spawn(async move {
            if let Err(e) = task.await {
                tracing::debug!(task = label, error = %e, "background task failed");
            }
        });
    }

    /// Number of tasks not yet reaped.
    pub async fn pending(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Wait for every task spawned so far.
    ///
    /// Tasks spawned while draining land in a fresh set and are not awaited.
    pub async fn drain(&self) {
        let mut set = std::mem::take(&mut *self.inner.lock().await);
        while let Some(finished) = set.join_next().await {
            log_join(finished);
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1
            && let Ok(mut set) = self.inner.try_lock()
        {
            set.detach_all();
        }
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result
        && e.is_panic()
    {
        tracing::warn!(error = %e, "background task panicked");
    }
}
