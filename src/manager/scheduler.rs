//! Delayed-task scheduler for retries.

use crate::core::ResilienceError;

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinSet;

/// Runs retry attempts after their backoff delay.
///
/// Each scheduled task sleeps on the runtime timer rather than blocking a
/// thread, then runs on a fresh task so retries never grow the caller's
/// stack. One scheduler is shared by every wrapper composed from it.
///
/// A pending retry keeps its wrapper, and with it the scheduler, alive, so
/// dropping the last wrapper does not cancel anything. Call
/// [`RetryScheduler::shutdown`] on teardown to abort every task still
/// waiting.
#[derive(Debug, Default)]
pub struct RetryScheduler {
    tasks: Mutex<JoinSet<()>>,
    shutdown: AtomicBool,
}

impl RetryScheduler {
    /// Creates a new scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` after `delay`.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// `SchedulerShutdown` once [`shutdown`](Self::shutdown) was called.
    pub fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> Result<(), ResilienceError> {
        if self.is_shutdown() {
            return Err(ResilienceError::SchedulerShutdown);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ResilienceError::internal(format!("no Tokio runtime to schedule on: {e}")))?;

        let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        reap_finished(&mut tasks);
        tasks.spawn_on(
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                task.await;
            },
            &runtime,
        );

        tracing::trace!(delay_ms = delay.as_millis() as u64, pending = tasks.len(), "Task scheduled");
        Ok(())
    }

    /// Returns the number of tasks waiting or running.
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        reap_finished(&mut tasks);
        tasks.len()
    }

    /// Stops accepting tasks and aborts those still pending.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let aborted = tasks.len();
        tasks.abort_all();
        reap_finished(&mut tasks);
        tracing::debug!(aborted, "Retry scheduler shut down");
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) was called.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        if let Err(e) = result {
            if e.is_panic() {
                tracing::error!(error = %e, "Scheduled task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_runs_after_delay() {
        let scheduler = RetryScheduler::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let started = Instant::now();

        scheduler
            .schedule(
                Duration::from_millis(30),
                async move {
                    let _ = tx.send(Instant::now());
                }
                .boxed(),
            )
            .unwrap();
        assert_eq!(scheduler.pending(), 1);

        let ran_at = rx.await.unwrap();
        assert!(ran_at - started >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_and_aborts() {
        let scheduler = RetryScheduler::new();
        let runs = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&runs);
        scheduler
            .schedule(
                Duration::from_millis(50),
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                .boxed(),
            )
            .unwrap();

        scheduler.shutdown();
        assert!(scheduler.is_shutdown());

        let result = scheduler.schedule(Duration::ZERO, async {}.boxed());
        assert!(matches!(result, Err(ResilienceError::SchedulerShutdown)));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_schedule_outside_runtime_fails() {
        let scheduler = RetryScheduler::new();
        let result = scheduler.schedule(Duration::ZERO, async {}.boxed());
        assert!(matches!(result, Err(ResilienceError::Internal { .. })));
    }
}
