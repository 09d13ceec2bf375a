//! Supervised background work
//!
//! Request handlers hand fire-and-forget work (outbound email) to the
//! [`BackgroundRunner`] and return without waiting. Every task is tracked until
//! it finishes, so shutdown can wait for all of them before the database pool
//! is closed.
//!
//! A task that returns `Err` or panics is logged and otherwise ignored; the
//! failure never reaches the request that scheduled it.

use futures::FutureExt;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio_util::task::TaskTracker;

/// Tracked set of in-flight background tasks
///
/// Cheap to clone; clones share the same tracker.
#[derive(Clone, Default)]
pub struct BackgroundRunner {
    tracker: TaskTracker,
}

impl BackgroundRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` and return immediately
    pub fn run<F, E>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.tracker.spawn(async move {
            let result: Result<Result<(), E>, Box<dyn std::any::Any + Send>> =
                AssertUnwindSafe(task).catch_unwind().await;
            match result {
                Ok(Ok(())) => {
                    tracing::debug!(task = %name, "Background task completed");
                }
                Ok(Err(e)) => {
                    tracing::error!(task = %name, error = %e, "Background task failed");
                }
                Err(panic_info) => {
                    let panic_msg: String = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    tracing::error!(task = %name, panic = %panic_msg, "Background task panicked");
                }
            }
        });
    }

    /// Number of tasks still running
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Block until every scheduled task has finished
    ///
    /// Called once during shutdown, after the listener has stopped accepting.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// [`wait`](Self::wait), logging a warning every `warn_every` while
    /// tasks are still outstanding
    ///
    /// Never gives up: storage is closed after this returns.
    pub async fn drain(&self, warn_every: Duration) {
        let pending = self.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for background tasks");
        }

        let wait = self.wait();
        tokio::pin!(wait);
        let mut waited = Duration::ZERO;
        while tokio::time::timeout(warn_every, &mut wait).await.is_err() {
            waited += warn_every;
            tracing::warn!(
                pending = self.len(),
                waited_secs = waited.as_secs(),
                "Still waiting for background tasks"
            );
        }
    }
}
