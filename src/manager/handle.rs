//! Handles to units of work processed in the background.

use crate::core::ResilienceError;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// How a unit of work's lifecycle ended successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The operation succeeded.
    Completed {
        /// Number of attempts made, the successful one included.
        attempts: u32,
    },
    /// Retries were exhausted but compensation produced a fallback.
    Recovered {
        /// Number of attempts made.
        attempts: u32,
    },
    /// The unit vanished from its source before a retry; nothing left to do.
    Abandoned {
        /// Number of attempts made.
        attempts: u32,
    },
}

impl Completion {
    /// Returns the number of attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Completed { attempts } | Self::Recovered { attempts } | Self::Abandoned { attempts } => {
                *attempts
            }
        }
    }

    /// Returns `true` if the operation itself succeeded.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Status of a submitted unit of work.
#[derive(Debug, Clone)]
pub enum WorkStatus {
    /// Waiting for its first attempt.
    Pending,
    /// An attempt is running.
    InProgress {
        /// The running attempt (1-based).
        attempt: u32,
    },
    /// An attempt failed and the next one is scheduled.
    RetryScheduled {
        /// The attempt that failed.
        attempt: u32,
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// The operation succeeded.
    Completed {
        /// Number of attempts made.
        attempts: u32,
    },
    /// Retries were exhausted and compensation recovered the unit.
    Compensated {
        /// Number of attempts made.
        attempts: u32,
    },
    /// The unit left its source before a retry.
    Abandoned {
        /// Number of attempts made.
        attempts: u32,
    },
    /// The lifecycle ended in an error.
    Failed {
        /// The error surfaced to the caller.
        error: ResilienceError,
    },
}

impl WorkStatus {
    /// Returns `true` for statuses that end the lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Compensated { .. } | Self::Abandoned { .. } | Self::Failed { .. }
        )
    }

    /// Returns the final result for a terminal status.
    pub fn outcome(&self) -> Option<Result<Completion, ResilienceError>> {
        match self {
            Self::Completed { attempts } => Some(Ok(Completion::Completed { attempts: *attempts })),
            Self::Compensated { attempts } => Some(Ok(Completion::Recovered { attempts: *attempts })),
            Self::Abandoned { attempts } => Some(Ok(Completion::Abandoned { attempts: *attempts })),
            Self::Failed { error } => Some(Err(error.clone())),
            Self::Pending | Self::InProgress { .. } | Self::RetryScheduled { .. } => None,
        }
    }
}

impl From<Result<Completion, ResilienceError>> for WorkStatus {
    fn from(result: Result<Completion, ResilienceError>) -> Self {
        match result {
            Ok(Completion::Completed { attempts }) => Self::Completed { attempts },
            Ok(Completion::Recovered { attempts }) => Self::Compensated { attempts },
            Ok(Completion::Abandoned { attempts }) => Self::Abandoned { attempts },
            Err(error) => Self::Failed { error },
        }
    }
}

/// A handle to a unit of work whose lifecycle runs on the scheduler.
#[derive(Debug, Clone)]
pub struct WorkHandle {
    /// Unique identifier for this submission.
    pub id: String,
    /// Status published by the lifecycle.
    status: watch::Receiver<WorkStatus>,
}

impl WorkHandle {
    /// Returns the current status.
    pub fn status(&self) -> WorkStatus {
        self.status.borrow().clone()
    }

    /// Returns true if the lifecycle has ended.
    pub fn is_complete(&self) -> bool {
        self.status.borrow().is_terminal()
    }

    /// Returns true if no attempt has started yet.
    pub fn is_pending(&self) -> bool {
        matches!(*self.status.borrow(), WorkStatus::Pending)
    }

    /// Returns true while a retry is waiting for its delay.
    pub fn is_retry_scheduled(&self) -> bool {
        matches!(*self.status.borrow(), WorkStatus::RetryScheduled { .. })
    }

    /// Waits for the lifecycle to end and returns its result.
    ///
    /// Returns `SchedulerShutdown` if the lifecycle was dropped before
    /// finishing, e.g. because the scheduler was shut down.
    pub async fn wait(mut self) -> Result<Completion, ResilienceError> {
        loop {
            if let Some(outcome) = self.status.borrow_and_update().outcome() {
                return outcome;
            }
            if self.status.changed().await.is_err() {
                return self
                    .status
                    .borrow()
                    .outcome()
                    .unwrap_or(Err(ResilienceError::SchedulerShutdown));
            }
        }
    }
}

/// Publishing side of a [`WorkHandle`], carried by the lifecycle.
///
/// When the last tracker is dropped before a terminal status is published,
/// waiting handles resolve to `SchedulerShutdown`.
#[derive(Debug, Clone)]
pub(crate) struct WorkTracker {
    status: Arc<watch::Sender<WorkStatus>>,
}

impl WorkTracker {
    /// Creates a tracker and the handle observing it.
    pub(crate) fn new() -> (Self, WorkHandle) {
        let (sender, receiver) = watch::channel(WorkStatus::Pending);
        let handle = WorkHandle {
            id: Uuid::new_v4().to_string(),
            status: receiver,
        };
        (
            Self {
                status: Arc::new(sender),
            },
            handle,
        )
    }

    pub(crate) fn set_in_progress(&self, attempt: u32) {
        self.status.send_replace(WorkStatus::InProgress { attempt });
    }

    pub(crate) fn set_retry_scheduled(&self, attempt: u32, delay: Duration) {
        self.status
            .send_replace(WorkStatus::RetryScheduled { attempt, delay });
    }

    pub(crate) fn finish(&self, result: Result<Completion, ResilienceError>) {
        self.status.send_replace(result.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_handle_transitions() {
        let (tracker, handle) = WorkTracker::new();
        assert!(handle.is_pending());
        assert!(!handle.is_complete());

        tracker.set_in_progress(1);
        assert!(matches!(handle.status(), WorkStatus::InProgress { attempt: 1 }));

        tracker.set_retry_scheduled(1, Duration::from_millis(10));
        assert!(handle.is_retry_scheduled());

        tracker.finish(Ok(Completion::Recovered { attempts: 2 }));
        assert!(handle.is_complete());
        assert!(matches!(handle.status(), WorkStatus::Compensated { attempts: 2 }));
    }

    #[tokio::test]
    async fn test_wait_returns_outcome() {
        let (tracker, handle) = WorkTracker::new();
        let waiter = tokio::spawn(handle.wait());

        tracker.set_in_progress(1);
        tracker.finish(Ok(Completion::Completed { attempts: 1 }));

        let completion = waiter.await.unwrap().unwrap();
        assert_eq!(completion, Completion::Completed { attempts: 1 });
        assert_eq!(completion.attempts(), 1);
    }

    #[tokio::test]
    async fn test_wait_after_tracker_dropped() {
        let (tracker, handle) = WorkTracker::new();
        tracker.set_in_progress(1);
        drop(tracker);

        let result = handle.wait().await;
        assert!(matches!(result, Err(ResilienceError::SchedulerShutdown)));
    }

    #[tokio::test]
    async fn test_wait_sees_error() {
        let (tracker, handle) = WorkTracker::new();
        tracker.finish(Err(ResilienceError::internal("boom")));
        drop(tracker);

        let result = handle.wait().await;
        assert!(matches!(result, Err(ResilienceError::Internal { .. })));
    }
}
