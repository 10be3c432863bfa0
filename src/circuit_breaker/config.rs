//! Circuit breaker configuration.

use crate::core::{ErrorKind, OperationError};
use std::time::Duration;

/// Configuration for a circuit breaker.
///
/// Constructed once and never mutated after the breaker is created.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure rate within the window (0.0 to 1.0) at or above which the circuit opens.
    pub failure_rate_threshold: f64,

    /// Absolute number of failures within the window at which the circuit opens.
    pub failure_count_threshold: u32,

    /// Minimum calls in the window before the rate and count checks apply.
    pub minimum_number_of_calls: u32,

    /// Length of the tumbling window after which window counters reset.
    pub sliding_window_size: Duration,

    /// How long the circuit stays open before a probe is allowed.
    pub wait_duration_in_open_state: Duration,

    /// Number of successful probes in half-open state needed to close the circuit.
    pub permitted_calls_in_half_open_state: u32,

    /// Timeout applied by [`CircuitBreaker::call`](super::CircuitBreaker::call).
    pub timeout_duration: Duration,

    /// Whether an admission check after the wait duration moves the circuit to half-open.
    pub automatic_transition_from_open_to_half_open: bool,

    /// Which errors count as failures.
    pub failure_policy: FailurePolicy,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            failure_count_threshold: 5,
            minimum_number_of_calls: 5,
            sliding_window_size: Duration::from_secs(60),
            wait_duration_in_open_state: Duration::from_secs(30),
            permitted_calls_in_half_open_state: 3,
            timeout_duration: Duration::from_secs(10),
            automatic_transition_from_open_to_half_open: true,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure rate threshold, clamped to 0.0..=1.0.
    pub fn with_failure_rate_threshold(mut self, threshold: f64) -> Self {
        self.failure_rate_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Sets the absolute failure count threshold.
    pub fn with_failure_count_threshold(mut self, threshold: u32) -> Self {
        self.failure_count_threshold = threshold.max(1);
        self
    }

    /// Sets the minimum number of calls before thresholds apply.
    pub fn with_minimum_number_of_calls(mut self, calls: u32) -> Self {
        self.minimum_number_of_calls = calls;
        self
    }

    /// Sets the window size.
    pub fn with_sliding_window_size(mut self, window: Duration) -> Self {
        self.sliding_window_size = window;
        self
    }

    /// Sets how long the circuit stays open.
    pub fn with_wait_duration_in_open_state(mut self, duration: Duration) -> Self {
        self.wait_duration_in_open_state = duration;
        self
    }

    /// Sets the half-open probe budget.
    pub fn with_permitted_calls_in_half_open_state(mut self, calls: u32) -> Self {
        self.permitted_calls_in_half_open_state = calls.max(1);
        self
    }

    /// Sets the call timeout.
    pub fn with_timeout_duration(mut self, timeout: Duration) -> Self {
        self.timeout_duration = timeout;
        self
    }

    /// Enables or disables the automatic open to half-open transition.
    pub fn with_automatic_transition(mut self, enabled: bool) -> Self {
        self.automatic_transition_from_open_to_half_open = enabled;
        self
    }

    /// Sets the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Adds error kinds that never count as failures.
    pub fn ignore_errors(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.failure_policy.ignore.extend(kinds);
        self
    }

    /// Restricts counted failures to these error kinds.
    pub fn record_errors(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.failure_policy.record.extend(kinds);
        self
    }

    /// Creates a configuration that trips early and recovers slowly.
    ///
    /// This configuration:
    /// - Opens at a 25% failure rate or 3 failures
    /// - Keeps circuits open longer (60 seconds)
    /// - Needs 5 successful probes to close
    pub fn strict() -> Self {
        Self {
            failure_rate_threshold: 0.25,
            failure_count_threshold: 3,
            minimum_number_of_calls: 3,
            wait_duration_in_open_state: Duration::from_secs(60),
            permitted_calls_in_half_open_state: 5,
            ..Self::default()
        }
    }

    /// Creates a configuration optimized for high availability.
    ///
    /// This configuration:
    /// - Opens only at a 75% failure rate or 20 failures
    /// - Keeps circuits open for a shorter time (10 seconds)
    /// - Closes after 2 successful probes
    pub fn high_availability() -> Self {
        Self {
            failure_rate_threshold: 0.75,
            failure_count_threshold: 20,
            minimum_number_of_calls: 10,
            wait_duration_in_open_state: Duration::from_secs(10),
            permitted_calls_in_half_open_state: 2,
            ..Self::default()
        }
    }
}

/// Defines which errors count as failures for the circuit breaker.
#[derive(Debug, Clone, Default)]
pub struct FailurePolicy {
    /// Error kinds that never count as failures. Checked first.
    pub ignore: Vec<ErrorKind>,
    /// If non-empty, only these error kinds count as failures.
    pub record: Vec<ErrorKind>,
}

impl FailurePolicy {
    /// Creates a policy that counts all errors as failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy that only counts network-level failures.
    pub fn network_only() -> Self {
        Self {
            ignore: Vec::new(),
            record: ErrorKind::network_kinds(),
        }
    }

    /// Determines if an error should be counted as a failure.
    ///
    /// Kinds are matched against the error and its directly wrapped cause.
    pub fn should_count(&self, error: &OperationError) -> bool {
        if error.matches_any(&self.ignore) {
            return false;
        }
        self.record.is_empty() || error.matches_any(&self.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_count_threshold, 5);
        assert_eq!(config.permitted_calls_in_half_open_state, 3);
        assert_eq!(config.wait_duration_in_open_state, Duration::from_secs(30));
        assert!(config.automatic_transition_from_open_to_half_open);
    }

    #[test]
    fn test_config_builder_clamps() {
        let config = CircuitBreakerConfig::new()
            .with_failure_rate_threshold(1.7)
            .with_permitted_calls_in_half_open_state(0)
            .with_wait_duration_in_open_state(Duration::from_secs(60));

        assert_eq!(config.failure_rate_threshold, 1.0);
        assert_eq!(config.permitted_calls_in_half_open_state, 1);
        assert_eq!(config.wait_duration_in_open_state, Duration::from_secs(60));
    }

    #[test]
    fn test_ignore_list_checked_first() {
        let policy = FailurePolicy {
            ignore: vec![ErrorKind::Timeout],
            record: vec![ErrorKind::Timeout, ErrorKind::Connection],
        };

        assert!(!policy.should_count(&OperationError::timeout("slow")));
        assert!(policy.should_count(&OperationError::connection("refused")));
        assert!(!policy.should_count(&OperationError::invalid_input("bad")));
    }

    #[test]
    fn test_empty_policy_counts_everything() {
        let policy = FailurePolicy::new();
        assert!(policy.should_count(&OperationError::invalid_input("bad")));
    }

    #[test]
    fn test_policy_inspects_wrapped_cause() {
        let policy = FailurePolicy::network_only();
        let wrapped = OperationError::internal("client").with_cause(OperationError::timeout("read"));
        assert!(policy.should_count(&wrapped));
    }
}
