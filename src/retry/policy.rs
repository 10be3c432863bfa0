//! Retry policy: attempt budget, backoff calculation and retry eligibility.

use crate::core::{ErrorKind, OperationError};
use crate::retry::backoff::BackoffStrategy;
use crate::retry::condition::RetryCondition;

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Configuration for retry behavior.
///
/// A policy is pure configuration plus calculation: no state, no I/O.
/// `max_attempts` is the total number of invocations a unit of work gets,
/// the first one included.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Maximum delay between retries.
    pub max_delay: Duration,

    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,

    /// How the delay grows with the attempt number.
    pub strategy: BackoffStrategy,

    /// Randomization fraction for [`BackoffStrategy::ExponentialJitter`].
    pub jitter_factor: f64,

    /// Which errors may be retried.
    pub retry_condition: RetryCondition,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            strategy: BackoffStrategy::Exponential,
            jitter_factor: 0.1,
            retry_condition: RetryCondition::always(),
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables retries: the first failure gives up.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            retry_condition: RetryCondition::never(),
            ..Self::default()
        }
    }

    /// Many quick retries: 5 attempts, 100ms base delay.
    pub fn fast() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Few slow retries: 2 attempts, 5s base delay.
    pub fn conservative() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Default budget, retrying network-level errors only.
    pub fn network_errors_only() -> Self {
        Self {
            retry_condition: RetryCondition::network_errors(),
            ..Self::default()
        }
    }

    /// Default budget, retrying only the given error kinds.
    pub fn for_error_kinds(kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            retry_condition: RetryCondition::on_kinds(kinds),
            ..Self::default()
        }
    }

    /// Default budget, retrying everything except the given error kinds.
    pub fn ignoring_error_kinds(kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            retry_condition: RetryCondition::except_kinds(kinds),
            ..Self::default()
        }
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Sets the backoff strategy.
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the jitter factor, clamped to 0.0..=1.0.
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Sets the retry condition.
    pub fn with_retry_condition(mut self, condition: RetryCondition) -> Self {
        self.retry_condition = condition;
        self
    }

    /// Calculates the delay before retrying after `attempt` (1-based) failed.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        self.calculate_delay_with_rng(attempt, &mut rand::rng())
    }

    /// Calculates the delay using the given random source.
    pub fn calculate_delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let attempt = attempt.max(1);
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Linear => base_ms * f64::from(attempt),
            BackoffStrategy::Exponential => self.exponential_ms(base_ms, attempt),
            BackoffStrategy::ExponentialJitter => {
                let exponential = self.exponential_ms(base_ms, attempt).min(max_ms);
                if self.jitter_factor > 0.0 {
                    let factor = 1.0 + rng.random_range(-self.jitter_factor..=self.jitter_factor);
                    exponential * factor
                } else {
                    exponential
                }
            }
            BackoffStrategy::Random => {
                if max_ms <= base_ms {
                    base_ms
                } else {
                    rng.random_range(base_ms..=max_ms)
                }
            }
        };

        let delay_ms = if self.strategy.is_capped() {
            delay_ms.min(max_ms)
        } else {
            delay_ms
        };

        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Returns `true` if the error is eligible for a retry.
    pub fn should_retry(&self, error: &OperationError) -> bool {
        self.retry_condition.test(error)
    }

    /// Returns `true` if another attempt is allowed after `attempt` (1-based) failed.
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    fn exponential_ms(&self, base_ms: f64, attempt: u32) -> f64 {
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        base_ms * self.backoff_multiplier.powi(exponent)
    }
}

/// Executes an async operation inline, sleeping between attempts.
///
/// Suited to direct remote calls where the caller awaits the result. Queued
/// units of work should go through [`ResilientOperation`](crate::manager::ResilientOperation)
/// instead, which schedules retries rather than holding the task.
pub async fn retry_async<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T, OperationError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, OperationError>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !policy.has_attempts_left(attempt) || !policy.should_retry(&e) {
                    return Err(e);
                }
                let delay = policy.calculate_delay(attempt);
                tracing::debug!(
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying operation"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.strategy, BackoffStrategy::Exponential);
    }

    #[test]
    fn test_presets() {
        let fast = RetryPolicy::fast();
        assert_eq!(fast.max_attempts, 5);
        assert_eq!(fast.base_delay, Duration::from_millis(100));

        let conservative = RetryPolicy::conservative();
        assert_eq!(conservative.max_attempts, 2);
        assert_eq!(conservative.base_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_attempts, 0);
        assert!(!policy.has_attempts_left(1));
        assert!(!policy.should_retry(&OperationError::timeout("slow")));
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0)
            .with_max_delay(Duration::from_secs(10));

        let delays: Vec<u64> = (1..=4)
            .map(|attempt| policy.calculate_delay(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800]);
    }

    #[test]
    fn test_fixed_and_linear_delays() {
        let fixed = RetryPolicy::new()
            .with_strategy(BackoffStrategy::Fixed)
            .with_base_delay(Duration::from_millis(50));
        assert_eq!(fixed.calculate_delay(1), Duration::from_millis(50));
        assert_eq!(fixed.calculate_delay(7), Duration::from_millis(50));

        let linear = fixed.with_strategy(BackoffStrategy::Linear);
        assert_eq!(linear.calculate_delay(3), Duration::from_millis(150));
    }

    #[test]
    fn test_delay_capped() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        // 1 * 10 = 10, but capped at 5
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(5));
        // Large attempt numbers stay capped
        assert_eq!(policy.calculate_delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new()
            .with_strategy(BackoffStrategy::ExponentialJitter)
            .with_base_delay(Duration::from_millis(1000))
            .with_max_delay(Duration::from_secs(60))
            .with_jitter_factor(0.25);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let delay = policy.calculate_delay_with_rng(1, &mut rng).as_millis();
            assert!((750..=1250).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_jitter_capped_at_max() {
        let policy = RetryPolicy::new()
            .with_strategy(BackoffStrategy::ExponentialJitter)
            .with_base_delay(Duration::from_millis(1000))
            .with_max_delay(Duration::from_millis(1000))
            .with_jitter_factor(0.5);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            assert!(policy.calculate_delay_with_rng(3, &mut rng) <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_random_within_base_and_max() {
        let policy = RetryPolicy::new()
            .with_strategy(BackoffStrategy::Random)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(300));
        let mut rng = StdRng::seed_from_u64(1);

        for attempt in 1..50 {
            let delay = policy.calculate_delay_with_rng(attempt, &mut rng).as_millis();
            assert!((100..=300).contains(&delay));
        }
    }

    #[test]
    fn test_error_kind_filters() {
        let policy = RetryPolicy::for_error_kinds([ErrorKind::Connection]);
        assert!(policy.should_retry(&OperationError::connection("reset")));
        assert!(!policy.should_retry(&OperationError::invalid_input("bad")));

        let policy = RetryPolicy::ignoring_error_kinds([ErrorKind::InvalidInput]);
        assert!(policy.should_retry(&OperationError::connection("reset")));
        assert!(!policy.should_retry(&OperationError::invalid_input("bad")));
    }

    #[tokio::test]
    async fn test_retry_async_succeeds_after_failures() {
        let policy = RetryPolicy::new()
            .with_strategy(BackoffStrategy::Fixed)
            .with_base_delay(Duration::from_millis(1));

        let result = retry_async(&policy, |attempt| async move {
            if attempt < 3 {
                Err(OperationError::timeout("slow"))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retry_async_stops_on_non_retryable() {
        let policy = RetryPolicy::network_errors_only().with_base_delay(Duration::from_millis(1));
        let mut calls = 0;

        let result: Result<(), _> = retry_async(&policy, |_| {
            calls += 1;
            async { Err(OperationError::invalid_input("bad")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
