//! Serializable configuration surface.
//!
//! [`CircuitBreakerSettings`] and [`RetryPolicySettings`] mirror the option
//! names callers configure (`failureRateThreshold`, `maxAttempts`, ...) so
//! they can be loaded from any format the caller already parses. Durations
//! are milliseconds and error kinds are given by name. Unlike the builder
//! setters, which clamp, conversion rejects out-of-range values.

use crate::circuit_breaker::{CircuitBreakerConfig, FailurePolicy};
use crate::core::{ErrorKind, ResilienceError};
use crate::retry::{BackoffStrategy, RetryCondition, RetryPolicy};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CircuitBreakerSettings {
    /// Failure rate (0.0 to 1.0) at which the circuit opens.
    pub failure_rate_threshold: f64,
    /// Failure count at which the circuit opens.
    pub failure_count_threshold: u32,
    /// Calls in the window before the thresholds apply.
    pub minimum_number_of_calls: u32,
    /// Window length in milliseconds.
    pub sliding_window_size: u64,
    /// Open-state wait in milliseconds.
    pub wait_duration_in_open_state: u64,
    /// Successful probes needed to close.
    pub permitted_number_of_calls_in_half_open_state: u32,
    /// Guarded-call timeout in milliseconds.
    pub timeout_duration: u64,
    /// Whether open circuits move to half-open on their own.
    pub automatic_transition_from_open_to_half_open: bool,
    /// Error kinds that never count as failures.
    pub ignore_exceptions: Vec<String>,
    /// If non-empty, the only error kinds that count as failures.
    pub record_failure_predicate: Vec<String>,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

impl From<&CircuitBreakerConfig> for CircuitBreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_rate_threshold: config.failure_rate_threshold,
            failure_count_threshold: config.failure_count_threshold,
            minimum_number_of_calls: config.minimum_number_of_calls,
            sliding_window_size: millis(config.sliding_window_size),
            wait_duration_in_open_state: millis(config.wait_duration_in_open_state),
            permitted_number_of_calls_in_half_open_state: config.permitted_calls_in_half_open_state,
            timeout_duration: millis(config.timeout_duration),
            automatic_transition_from_open_to_half_open: config
                .automatic_transition_from_open_to_half_open,
            ignore_exceptions: kind_names(&config.failure_policy.ignore),
            record_failure_predicate: kind_names(&config.failure_policy.record),
        }
    }
}

impl CircuitBreakerSettings {
    /// Validates the settings and converts them into a runtime config.
    pub fn into_config(self) -> Result<CircuitBreakerConfig, ResilienceError> {
        if !(0.0..=1.0).contains(&self.failure_rate_threshold) {
            return Err(ResilienceError::configuration(format!(
                "failureRateThreshold must be within 0.0..=1.0, got {}",
                self.failure_rate_threshold
            )));
        }
        if self.failure_count_threshold == 0 {
            return Err(ResilienceError::configuration(
                "failureCountThreshold must be at least 1",
            ));
        }
        if self.permitted_number_of_calls_in_half_open_state == 0 {
            return Err(ResilienceError::configuration(
                "permittedNumberOfCallsInHalfOpenState must be at least 1",
            ));
        }
        if self.sliding_window_size == 0 {
            return Err(ResilienceError::configuration("slidingWindowSize must be positive"));
        }

        Ok(CircuitBreakerConfig {
            failure_rate_threshold: self.failure_rate_threshold,
            failure_count_threshold: self.failure_count_threshold,
            minimum_number_of_calls: self.minimum_number_of_calls,
            sliding_window_size: Duration::from_millis(self.sliding_window_size),
            wait_duration_in_open_state: Duration::from_millis(self.wait_duration_in_open_state),
            permitted_calls_in_half_open_state: self.permitted_number_of_calls_in_half_open_state,
            timeout_duration: Duration::from_millis(self.timeout_duration),
            automatic_transition_from_open_to_half_open: self
                .automatic_transition_from_open_to_half_open,
            failure_policy: FailurePolicy {
                ignore: parse_kinds(&self.ignore_exceptions),
                record: parse_kinds(&self.record_failure_predicate),
            },
        })
    }
}

/// Retry policy options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RetryPolicySettings {
    /// Total invocations allowed.
    pub max_attempts: u32,
    /// Base delay in milliseconds.
    pub base_delay: u64,
    /// Delay cap in milliseconds.
    pub max_delay: u64,
    /// Exponential growth factor.
    pub backoff_multiplier: f64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Randomization fraction for exponential jitter.
    pub jitter_factor: f64,
    /// If non-empty, only these error kinds are retried.
    pub retry_on: Vec<String>,
    /// Error kinds never retried.
    pub ignore_exceptions: Vec<String>,
}

impl Default for RetryPolicySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay: millis(policy.base_delay),
            max_delay: millis(policy.max_delay),
            backoff_multiplier: policy.backoff_multiplier,
            backoff_strategy: policy.strategy,
            jitter_factor: policy.jitter_factor,
            retry_on: Vec::new(),
            ignore_exceptions: Vec::new(),
        }
    }
}

impl RetryPolicySettings {
    /// Validates the settings and converts them into a runtime policy.
    pub fn into_policy(self) -> Result<RetryPolicy, ResilienceError> {
        if self.base_delay > self.max_delay {
            return Err(ResilienceError::configuration(format!(
                "baseDelay ({}ms) exceeds maxDelay ({}ms)",
                self.base_delay, self.max_delay
            )));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ResilienceError::configuration(format!(
                "backoffMultiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ResilienceError::configuration(format!(
                "jitterFactor must be within 0.0..=1.0, got {}",
                self.jitter_factor
            )));
        }

        let retry_on = parse_kinds(&self.retry_on);
        let ignored = parse_kinds(&self.ignore_exceptions);
        let condition = match (retry_on.is_empty(), ignored.is_empty()) {
            (true, true) => RetryCondition::always(),
            (false, true) => RetryCondition::on_kinds(retry_on),
            (true, false) => RetryCondition::except_kinds(ignored),
            (false, false) => RetryCondition::on_kinds(retry_on).and(RetryCondition::except_kinds(ignored)),
        };

        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay),
            max_delay: Duration::from_millis(self.max_delay),
            backoff_multiplier: self.backoff_multiplier,
            strategy: self.backoff_strategy,
            jitter_factor: self.jitter_factor,
            retry_condition: condition,
        })
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn kind_names(kinds: &[ErrorKind]) -> Vec<String> {
    kinds.iter().map(|kind| kind.name().to_string()).collect()
}

fn parse_kinds(names: &[String]) -> Vec<ErrorKind> {
    names.iter().map(|name| ErrorKind::from_name(name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OperationError;

    #[test]
    fn test_breaker_settings_from_json() {
        let json = r#"{
            "failureRateThreshold": 0.3,
            "minimumNumberOfCalls": 10,
            "waitDurationInOpenState": 5000,
            "permittedNumberOfCallsInHalfOpenState": 2,
            "ignoreExceptions": ["invalid_input"],
            "recordFailurePredicate": ["timeout", "connection"]
        }"#;
        let settings: CircuitBreakerSettings = serde_json::from_str(json).unwrap();
        let config = settings.into_config().unwrap();

        assert_eq!(config.failure_rate_threshold, 0.3);
        assert_eq!(config.minimum_number_of_calls, 10);
        assert_eq!(config.wait_duration_in_open_state, Duration::from_secs(5));
        assert_eq!(config.permitted_calls_in_half_open_state, 2);
        // Unspecified options keep their defaults
        assert_eq!(config.failure_count_threshold, 5);
        assert!(!config.failure_policy.should_count(&OperationError::invalid_input("x")));
        assert!(config.failure_policy.should_count(&OperationError::timeout("t")));
        assert!(!config.failure_policy.should_count(&OperationError::internal("i")));
    }

    #[test]
    fn test_breaker_settings_reject_bad_rate() {
        let settings = CircuitBreakerSettings {
            failure_rate_threshold: 1.5,
            ..CircuitBreakerSettings::default()
        };
        assert!(matches!(
            settings.into_config(),
            Err(ResilienceError::Configuration { .. })
        ));
    }

    #[test]
    fn test_breaker_settings_reject_zero_count_threshold() {
        let settings: CircuitBreakerSettings =
            serde_json::from_str(r#"{"failureCountThreshold": 0}"#).unwrap();
        assert!(matches!(
            settings.into_config(),
            Err(ResilienceError::Configuration { .. })
        ));
    }

    #[test]
    fn test_unknown_option_rejected() {
        let result: Result<CircuitBreakerSettings, _> = serde_json::from_str(r#"{"failureRate": 0.5}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_retry_settings_from_json() {
        let json = r#"{
            "maxAttempts": 5,
            "baseDelay": 50,
            "maxDelay": 2000,
            "backoffStrategy": "FIXED",
            "retryOn": ["timeout", "quota_exceeded"]
        }"#;
        let settings: RetryPolicySettings = serde_json::from_str(json).unwrap();
        let policy = settings.into_policy().unwrap();

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.strategy, BackoffStrategy::Fixed);
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(50));
        assert!(policy.should_retry(&OperationError::timeout("t")));
        assert!(policy.should_retry(&OperationError::new(ErrorKind::named("quota_exceeded"), "q")));
        assert!(!policy.should_retry(&OperationError::connection("c")));
    }

    #[test]
    fn test_retry_settings_combine_allow_and_deny() {
        let settings = RetryPolicySettings {
            retry_on: vec!["timeout".into(), "connection".into()],
            ignore_exceptions: vec!["connection".into()],
            ..RetryPolicySettings::default()
        };
        let policy = settings.into_policy().unwrap();

        assert!(policy.should_retry(&OperationError::timeout("t")));
        assert!(!policy.should_retry(&OperationError::connection("c")));
    }

    #[test]
    fn test_retry_settings_reject_inverted_delays() {
        let settings = RetryPolicySettings {
            base_delay: 10_000,
            max_delay: 100,
            ..RetryPolicySettings::default()
        };
        assert!(settings.into_policy().is_err());
    }

    #[test]
    fn test_settings_roundtrip_defaults() {
        let json = serde_json::to_string(&RetryPolicySettings::default()).unwrap();
        assert!(json.contains("\"backoffStrategy\":\"exponential\""));
        let back: RetryPolicySettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RetryPolicySettings::default());

        let settings = CircuitBreakerSettings::from(&CircuitBreakerConfig::strict());
        assert_eq!(settings.into_config().unwrap().failure_count_threshold, 3);
    }
}
