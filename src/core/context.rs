//! Per-attempt failure context.

use crate::core::error::OperationError;
use crate::core::unit::{RetryKey, UnitOfWork};

use chrono::{DateTime, Utc};

/// Everything known about one failed attempt.
///
/// A new context is built for every failed attempt and threaded explicitly
/// through the failure handler and compensation actions.
#[derive(Debug, Clone)]
pub struct FailureContext {
    /// The error the attempt failed with.
    pub error: OperationError,
    /// 1-based number of the failed attempt.
    pub attempt: u32,
    /// Maximum attempts permitted by the policy in force.
    pub max_attempts: u32,
    /// When the failure was observed.
    pub failed_at: DateTime<Utc>,
    /// The unit of work being processed.
    pub unit: UnitOfWork,
    /// Retry-counter key of the unit.
    pub key: RetryKey,
}

impl FailureContext {
    /// Creates a context for a failed attempt of `unit`.
    pub fn new(unit: UnitOfWork, error: OperationError, attempt: u32, max_attempts: u32) -> Self {
        let key = unit.retry_key();
        Self {
            error,
            attempt: attempt.max(1),
            max_attempts,
            failed_at: Utc::now(),
            unit,
            key,
        }
    }

    /// Returns the identifier of the source the unit came from.
    pub fn source(&self) -> Option<&str> {
        self.unit.source.as_deref()
    }

    /// Returns the unit identifier.
    pub fn unit_id(&self) -> &str {
        &self.unit.id
    }

    /// Returns the logical action name.
    pub fn action(&self) -> &str {
        &self.unit.action
    }

    /// Returns the raw payload.
    pub fn payload(&self) -> &[u8] {
        &self.unit.payload
    }

    /// Returns `true` if no attempts remain under the policy.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
