//! Circuit breaker implementation.

use crate::audit;
use crate::circuit_breaker::config::CircuitBreakerConfig;
use crate::circuit_breaker::state::{BreakerMetrics, CircuitState, LifetimeCounters, WindowState};
use crate::core::{OperationError, ResilienceError};

use std::fmt;
use std::future::Future;
use std::sync::RwLock;
use std::time::Instant;

/// A circuit breaker guarding one protected operation.
///
/// The breaker tracks the aggregate health of the operation and fast-fails
/// calls while the dependency is judged unhealthy.
///
/// # States
///
/// - **Closed**: Normal operation. Calls pass through, failures are counted.
/// - **Open**: Dependency is failing. Calls are rejected immediately.
/// - **Half-Open**: Probing. Calls are admitted until enough probes have
///   succeeded; any failure reopens the circuit.
///
/// # Usage
///
/// [`is_call_permitted`](Self::is_call_permitted) must be called before every
/// attempt, and exactly one of [`record_success`](Self::record_success),
/// [`record_failure`](Self::record_failure) or
/// [`record_timeout`](Self::record_timeout) after each permitted attempt
/// resolves. [`call`](Self::call) does all of this for a single future.
///
/// ```rust,ignore
/// use breakwater::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
///
/// let breaker = CircuitBreaker::new("payments", CircuitBreakerConfig::default());
///
/// if breaker.is_call_permitted() {
///     match charge().await {
///         Ok(_) => breaker.record_success(),
///         Err(e) => breaker.record_failure(&e),
///     }
/// }
/// ```
pub struct CircuitBreaker {
    /// Name of the protected operation.
    name: String,
    /// Configuration.
    config: CircuitBreakerConfig,
    /// Current state and window counters.
    window: RwLock<WindowState>,
    /// Lifetime metrics.
    lifetime: RwLock<LifetimeCounters>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker with the given name and configuration.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            window: RwLock::new(WindowState::new(Instant::now())),
            lifetime: RwLock::new(LifetimeCounters::default()),
        }
    }

    /// Creates a new circuit breaker with default configuration.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Returns the name of this breaker.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns the current state of the circuit.
    pub fn state(&self) -> CircuitState {
        self.window
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .state
    }

    /// Returns a snapshot of the current metrics.
    pub fn metrics(&self) -> BreakerMetrics {
        let window = self
            .window
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let lifetime = self
            .lifetime
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        BreakerMetrics::from_parts(&self.name, &window, &lifetime)
    }

    /// Admission control: returns `true` if a call may proceed now.
    pub fn is_call_permitted(&self) -> bool {
        self.try_acquire().is_ok()
    }

    /// Admission control returning the denial as an error.
    pub fn try_acquire(&self) -> Result<(), ResilienceError> {
        let mut window = self
            .window
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();

        let denial = match window.state {
            CircuitState::Closed => return Ok(()),

            CircuitState::Open => {
                let opened_at = window.last_failure_at.unwrap_or(window.window_started_at);
                let elapsed = now.duration_since(opened_at);
                let wait = self.config.wait_duration_in_open_state;

                if elapsed >= wait && self.config.automatic_transition_from_open_to_half_open {
                    window.transition(CircuitState::HalfOpen, now);
                    drop(window);
                    self.note_transition(CircuitState::Open, CircuitState::HalfOpen);
                    return Ok(());
                }

                if elapsed >= wait {
                    "Waiting for manual transition to half-open".to_string()
                } else {
                    format!("Circuit may recover in {:?}", wait - elapsed)
                }
            }

            CircuitState::HalfOpen => {
                if window.success_count < self.config.permitted_calls_in_half_open_state {
                    return Ok(());
                }
                "Probe budget exhausted".to_string()
            }
        };

        drop(window);
        self.lifetime
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record_rejected();

        tracing::debug!(breaker = %self.name, reason = %denial, "Call rejected");

        Err(ResilienceError::CircuitOpen {
            name: self.name.clone(),
            recovery_hint: Some(denial),
        })
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut window = self
            .window
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.lifetime
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record_success();
        let now = Instant::now();

        let transition = match window.state {
            CircuitState::Closed => {
                window.roll_window(now, self.config.sliding_window_size);
                window.calls_in_window += 1;
                window.failure_count = 0;
                None
            }

            CircuitState::HalfOpen => {
                let successes = window.success_count + 1;
                if successes >= self.config.permitted_calls_in_half_open_state {
                    window.transition(CircuitState::Closed, now);
                    Some((CircuitState::HalfOpen, CircuitState::Closed))
                } else {
                    window.success_count = successes;
                    None
                }
            }

            // A call admitted before the circuit opened resolved late
            CircuitState::Open => None,
        };

        drop(window);
        if let Some((from, to)) = transition {
            self.note_transition(from, to);
        }
    }

    /// Records a failed call.
    ///
    /// Errors on the ignore list, or outside a non-empty record list, return
    /// without touching any counter.
    pub fn record_failure(&self, error: &OperationError) {
        if !self.config.failure_policy.should_count(error) {
            tracing::trace!(breaker = %self.name, error = %error, "Error not counted as failure");
            return;
        }

        self.lifetime
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record_failure();
        self.on_counted_failure();
    }

    /// Records a call the caller detected as stalled.
    ///
    /// Always counts as a failure, regardless of the failure policy.
    pub fn record_timeout(&self) {
        self.lifetime
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record_timeout();
        self.on_counted_failure();
    }

    /// Returns the circuit to closed and zeroes window counters.
    ///
    /// Lifetime metrics are kept.
    pub fn reset(&self) {
        let mut window = self
            .window
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let from = window.state;
        *window = WindowState::new(Instant::now());
        drop(window);

        if from != CircuitState::Closed {
            audit::emit_state_transition(&self.name, from, CircuitState::Closed);
        }
    }

    /// Forces the circuit into the open state.
    pub fn force_open(&self) {
        self.force(CircuitState::Open);
    }

    /// Forces the circuit into the closed state.
    pub fn force_close(&self) {
        self.force(CircuitState::Closed);
    }

    /// Moves an open circuit to half-open regardless of the wait duration.
    ///
    /// This is the way out of the open state when automatic transition is
    /// disabled. Has no effect unless the circuit is open.
    pub fn transition_to_half_open(&self) {
        let mut window = self
            .window
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !window.state.is_open() {
            return;
        }
        window.transition(CircuitState::HalfOpen, Instant::now());
        drop(window);
        self.note_transition(CircuitState::Open, CircuitState::HalfOpen);
    }

    /// Runs `call` through the breaker.
    ///
    /// Checks admission, applies the configured timeout, and records the
    /// outcome. No lock is held while the call runs.
    pub async fn call<F, T>(&self, call: F) -> Result<T, ResilienceError>
    where
        F: Future<Output = Result<T, OperationError>>,
    {
        self.try_acquire()?;

        match tokio::time::timeout(self.config.timeout_duration, call).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(error)) => {
                self.record_failure(&error);
                Err(ResilienceError::Failed {
                    action: self.name.clone(),
                    attempts: 1,
                    error,
                })
            }
            Err(_) => {
                self.record_timeout();
                Err(ResilienceError::Timeout {
                    name: self.name.clone(),
                    elapsed: self.config.timeout_duration,
                })
            }
        }
    }

    fn on_counted_failure(&self) {
        let mut window = self
            .window
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();

        let transition = match window.state {
            CircuitState::Closed => {
                window.roll_window(now, self.config.sliding_window_size);
                window.calls_in_window += 1;
                window.failure_count += 1;
                window.last_failure_at = Some(now);

                let enough_calls = window.calls_in_window >= self.config.minimum_number_of_calls;
                let rate_tripped = window.failure_rate() >= self.config.failure_rate_threshold;
                let count_tripped = window.failure_count >= self.config.failure_count_threshold;

                if enough_calls && (rate_tripped || count_tripped) {
                    window.transition(CircuitState::Open, now);
                    Some((CircuitState::Closed, CircuitState::Open))
                } else {
                    None
                }
            }

            CircuitState::HalfOpen => {
                window.last_failure_at = Some(now);
                window.transition(CircuitState::Open, now);
                Some((CircuitState::HalfOpen, CircuitState::Open))
            }

            CircuitState::Open => None,
        };

        drop(window);
        if let Some((from, to)) = transition {
            self.note_transition(from, to);
        }
    }

    fn force(&self, to: CircuitState) {
        let mut window = self
            .window
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let from = window.state;
        let now = Instant::now();
        window.transition(to, now);
        if to.is_open() {
            window.last_failure_at = Some(now);
        }
        drop(window);

        if from != to {
            self.note_transition(from, to);
        }
    }

    fn note_transition(&self, from: CircuitState, to: CircuitState) {
        self.lifetime
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record_transition(to);
        audit::emit_state_transition(&self.name, from, to);
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use std::time::Duration;

    fn tripping_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::default()
            .with_failure_rate_threshold(0.5)
            .with_failure_count_threshold(100)
            .with_minimum_number_of_calls(3)
            .with_permitted_calls_in_half_open_state(2)
            .with_wait_duration_in_open_state(Duration::from_millis(20))
    }

    fn fail(breaker: &CircuitBreaker, times: usize) {
        for _ in 0..times {
            assert!(breaker.is_call_permitted() || breaker.state().is_open());
            breaker.record_failure(&OperationError::connection("refused"));
        }
    }

    #[test]
    fn test_passes_through_when_closed() {
        let breaker = CircuitBreaker::with_defaults("db");
        assert!(breaker.is_call_permitted());
        breaker.record_success();
        assert!(breaker.state().is_closed());
        assert_eq!(breaker.metrics().successful_calls, 1);
    }

    #[test]
    fn test_opens_once_after_minimum_calls() {
        let breaker = CircuitBreaker::new("db", tripping_config());

        fail(&breaker, 2);
        assert!(breaker.state().is_closed());

        fail(&breaker, 1);
        assert!(breaker.state().is_open());

        // Further failures while open do not reopen
        breaker.record_failure(&OperationError::connection("refused"));
        assert_eq!(breaker.metrics().times_opened, 1);
        assert!(!breaker.is_call_permitted());
    }

    #[test]
    fn test_count_threshold_opens_circuit() {
        let config = CircuitBreakerConfig::default()
            .with_failure_rate_threshold(1.0)
            .with_failure_count_threshold(2)
            .with_minimum_number_of_calls(1);
        let breaker = CircuitBreaker::new("db", config);

        breaker.record_success();
        breaker.record_failure(&OperationError::timeout("slow"));
        assert!(breaker.state().is_closed());
        breaker.record_failure(&OperationError::timeout("slow"));
        assert!(breaker.state().is_open());
    }

    #[test]
    fn test_success_resets_failure_count_when_closed() {
        let breaker = CircuitBreaker::new("db", tripping_config());
        fail(&breaker, 2);
        breaker.record_success();

        let metrics = breaker.metrics();
        assert_eq!(metrics.failures_in_window, 0);
        assert_eq!(metrics.calls_in_window, 3);
    }

    #[test]
    fn test_rejects_when_open() {
        let breaker = CircuitBreaker::with_defaults("db");
        breaker.force_open();

        let result = breaker.try_acquire();
        assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(breaker.metrics().rejected_calls, 1);
    }

    #[tokio::test]
    async fn test_transitions_to_half_open_after_wait() {
        let breaker = CircuitBreaker::new("db", tripping_config());
        fail(&breaker, 3);
        assert!(!breaker.is_call_permitted());

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(breaker.is_call_permitted());
        assert!(breaker.state().is_half_open());
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("db", tripping_config());
        fail(&breaker, 3);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(breaker.is_call_permitted());

        breaker.record_success();
        assert!(breaker.state().is_half_open());

        breaker.record_failure(&OperationError::connection("refused"));
        assert!(breaker.state().is_open());
        assert_eq!(breaker.metrics().times_opened, 2);
    }

    #[tokio::test]
    async fn test_half_open_successes_close() {
        let breaker = CircuitBreaker::new("db", tripping_config());
        fail(&breaker, 3);
        tokio::time::sleep(Duration::from_millis(30)).await;

        for _ in 0..2 {
            assert!(breaker.is_call_permitted());
            breaker.record_success();
        }

        assert!(breaker.state().is_closed());
        assert_eq!(breaker.metrics().times_closed, 1);
    }

    #[test]
    fn test_manual_transition_when_automatic_disabled() {
        let config = tripping_config()
            .with_wait_duration_in_open_state(Duration::ZERO)
            .with_automatic_transition(false);
        let breaker = CircuitBreaker::new("db", config);
        breaker.force_open();

        assert!(!breaker.is_call_permitted());
        assert!(breaker.state().is_open());

        breaker.transition_to_half_open();
        assert!(breaker.state().is_half_open());
        assert!(breaker.is_call_permitted());
    }

    #[test]
    fn test_ignored_errors_never_count() {
        let config = tripping_config().ignore_errors([ErrorKind::InvalidInput]);
        let breaker = CircuitBreaker::new("db", config);

        for _ in 0..10 {
            breaker.record_failure(&OperationError::invalid_input("bad request"));
        }

        let metrics = breaker.metrics();
        assert!(breaker.state().is_closed());
        assert_eq!(metrics.failures_in_window, 0);
        assert_eq!(metrics.calls_in_window, 0);
        assert_eq!(metrics.window_failure_rate, 0.0);
    }

    #[test]
    fn test_timeout_counts_even_when_not_recorded() {
        let config = tripping_config()
            .with_minimum_number_of_calls(1)
            .record_errors([ErrorKind::Connection]);
        let breaker = CircuitBreaker::new("db", config);

        breaker.record_timeout();
        assert!(breaker.state().is_open());
        assert_eq!(breaker.metrics().timeout_calls, 1);
    }

    #[test]
    fn test_reset_keeps_lifetime_metrics() {
        let breaker = CircuitBreaker::new("db", tripping_config());
        fail(&breaker, 3);
        assert!(breaker.state().is_open());

        breaker.reset();
        let metrics = breaker.metrics();
        assert!(metrics.state.is_closed());
        assert_eq!(metrics.failed_calls, 3);
        assert_eq!(metrics.calls_in_window, 0);
    }

    #[tokio::test]
    async fn test_call_records_timeout() {
        let config = tripping_config()
            .with_minimum_number_of_calls(1)
            .with_timeout_duration(Duration::from_millis(10));
        let breaker = CircuitBreaker::new("slow", config);

        let result = breaker
            .call(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, OperationError>(())
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::Timeout { .. })));
        assert!(breaker.state().is_open());
    }

    #[tokio::test]
    async fn test_call_passes_value_through() {
        let breaker = CircuitBreaker::with_defaults("fast");
        let value = breaker.call(async { Ok::<_, OperationError>(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(breaker.metrics().successful_calls, 1);
    }
}
