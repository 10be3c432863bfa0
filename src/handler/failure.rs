//! The retry-or-give-up decision for a failed attempt.

use crate::core::{ErrorKind, FailureContext};
use crate::handler::compensation::{ArcCompensation, LogCompensation};
use crate::retry::RetryPolicy;

use std::sync::Arc;
use std::time::Duration;

/// Decision taken for one failed attempt.
///
/// Exactly one of retry-after-delay or give-up-with-compensation.
#[derive(Debug, Clone)]
pub enum FailureHandlingResult {
    /// Invoke the operation again after `delay`.
    Retry {
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// Stop retrying and run the compensation, if any.
    GiveUp {
        /// Action to run for the exhausted unit.
        compensation: Option<ArcCompensation>,
    },
}

impl FailureHandlingResult {
    /// Returns `true` if the attempt should be retried.
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }

    /// Returns the retry delay, if retrying.
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::Retry { delay } => Some(*delay),
            Self::GiveUp { .. } => None,
        }
    }

    /// Returns the compensation action, if giving up with one.
    pub fn compensation(&self) -> Option<&ArcCompensation> {
        match self {
            Self::Retry { .. } => None,
            Self::GiveUp { compensation } => compensation.as_ref(),
        }
    }
}

/// Maps a [`FailureContext`] to a [`FailureHandlingResult`].
///
/// An attempt is retried iff the policy has attempts left after it and the
/// policy's retry condition accepts the error. `max_attempts` counts every
/// invocation, so a policy of 2 allows one retry.
///
/// # Examples
///
/// ```rust
/// use breakwater::core::ErrorKind;
/// use breakwater::handler::FailureHandler;
///
/// let handler = FailureHandler::retry_on_kinds([ErrorKind::Timeout], None);
/// assert_eq!(handler.policy().max_attempts, 3);
/// ```
#[derive(Debug, Clone)]
pub struct FailureHandler {
    policy: RetryPolicy,
    compensation: Option<ArcCompensation>,
}

impl FailureHandler {
    /// Creates a handler for `policy` with no compensation.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            compensation: None,
        }
    }

    /// Creates a handler for `policy` that runs `compensation` on give-up.
    pub fn with_policy(policy: RetryPolicy, compensation: ArcCompensation) -> Self {
        Self {
            policy,
            compensation: Some(compensation),
        }
    }

    /// Retries every error with the default policy, then logs.
    pub fn always_retry() -> Self {
        Self::with_policy(RetryPolicy::default(), Arc::new(LogCompensation))
    }

    /// Gives up on the first failure.
    pub fn always_give_up(compensation: Option<ArcCompensation>) -> Self {
        Self {
            policy: RetryPolicy::no_retry(),
            compensation,
        }
    }

    /// Retries only errors of `kinds` (or caused by them) with the default
    /// backoff.
    pub fn retry_on_kinds(
        kinds: impl IntoIterator<Item = ErrorKind>,
        compensation: Option<ArcCompensation>,
    ) -> Self {
        Self {
            policy: RetryPolicy::for_error_kinds(kinds),
            compensation,
        }
    }

    /// Replaces the compensation action.
    pub fn with_compensation(mut self, compensation: ArcCompensation) -> Self {
        self.compensation = Some(compensation);
        self
    }

    /// Returns the retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the compensation action, if any.
    pub fn compensation(&self) -> Option<&ArcCompensation> {
        self.compensation.as_ref()
    }

    /// Decides what to do about a failed attempt.
    pub fn handle(&self, ctx: &FailureContext) -> FailureHandlingResult {
        if self.policy.has_attempts_left(ctx.attempt) && self.policy.should_retry(&ctx.error) {
            let delay = self.policy.calculate_delay(ctx.attempt);
            tracing::debug!(
                unit_id = %ctx.unit_id(),
                attempt = ctx.attempt,
                delay_ms = delay.as_millis() as u64,
                "Failure is retryable"
            );
            FailureHandlingResult::Retry { delay }
        } else {
            tracing::debug!(
                unit_id = %ctx.unit_id(),
                attempt = ctx.attempt,
                max_attempts = self.policy.max_attempts,
                error_kind = %ctx.error.kind(),
                "Giving up on failure"
            );
            FailureHandlingResult::GiveUp {
                compensation: self.compensation.clone(),
            }
        }
    }
}

impl Default for FailureHandler {
    fn default() -> Self {
        Self::always_retry()
    }
}
