//! Circuit breaker state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// The current state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed; calls pass through normally.
    #[default]
    Closed,
    /// Circuit is open; calls are rejected.
    Open,
    /// Circuit is half-open; a limited number of probe calls pass through.
    HalfOpen,
}

impl CircuitState {
    /// Returns `true` if the circuit is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if the circuit is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if the circuit is half-open.
    pub fn is_half_open(&self) -> bool {
        matches!(self, Self::HalfOpen)
    }

    /// Returns the name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Window and probe counters guarded by the breaker's lock.
///
/// Every state transition goes through [`WindowState::transition`], which
/// zeroes the counters and restarts the window.
#[derive(Debug, Clone)]
pub(crate) struct WindowState {
    pub(crate) state: CircuitState,
    pub(crate) failure_count: u32,
    pub(crate) success_count: u32,
    pub(crate) calls_in_window: u32,
    pub(crate) window_started_at: Instant,
    pub(crate) last_failure_at: Option<Instant>,
}

impl WindowState {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            calls_in_window: 0,
            window_started_at: now,
            last_failure_at: None,
        }
    }

    /// Moves to `to`, resetting all window counters.
    pub(crate) fn transition(&mut self, to: CircuitState, now: Instant) {
        self.state = to;
        self.failure_count = 0;
        self.success_count = 0;
        self.calls_in_window = 0;
        self.window_started_at = now;
    }

    /// Tumbling reset: once the window has elapsed, calls and failures start
    /// again from zero.
    pub(crate) fn roll_window(&mut self, now: Instant, window: std::time::Duration) {
        if now.duration_since(self.window_started_at) > window {
            self.calls_in_window = 0;
            self.failure_count = 0;
            self.window_started_at = now;
        }
    }

    /// Failure rate within the current window (0.0 to 1.0).
    pub(crate) fn failure_rate(&self) -> f64 {
        if self.calls_in_window == 0 {
            return 0.0;
        }
        f64::from(self.failure_count) / f64::from(self.calls_in_window)
    }
}

/// Lifetime counters; never cleared by [`CircuitBreaker::reset`](super::CircuitBreaker::reset).
#[derive(Debug, Clone, Default)]
pub(crate) struct LifetimeCounters {
    pub(crate) total_calls: u64,
    pub(crate) successful_calls: u64,
    pub(crate) failed_calls: u64,
    pub(crate) timeout_calls: u64,
    pub(crate) rejected_calls: u64,
    pub(crate) times_opened: u64,
    pub(crate) times_closed: u64,
}

impl LifetimeCounters {
    pub(crate) fn record_success(&mut self) {
        self.total_calls += 1;
        self.successful_calls += 1;
    }

    pub(crate) fn record_failure(&mut self) {
        self.total_calls += 1;
        self.failed_calls += 1;
    }

    pub(crate) fn record_timeout(&mut self) {
        self.total_calls += 1;
        self.timeout_calls += 1;
    }

    pub(crate) fn record_rejected(&mut self) {
        self.rejected_calls += 1;
    }

    pub(crate) fn record_transition(&mut self, to: CircuitState) {
        match to {
            CircuitState::Open => self.times_opened += 1,
            CircuitState::Closed => self.times_closed += 1,
            CircuitState::HalfOpen => {}
        }
    }
}

/// A point-in-time snapshot of circuit breaker metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerMetrics {
    /// Name of the breaker.
    pub name: String,
    /// State at the time of the snapshot.
    pub state: CircuitState,
    /// Total number of resolved calls (successes, failures and timeouts).
    pub total_calls: u64,
    /// Number of successful calls.
    pub successful_calls: u64,
    /// Number of counted failures.
    pub failed_calls: u64,
    /// Number of timeouts.
    pub timeout_calls: u64,
    /// Number of calls rejected by admission control.
    pub rejected_calls: u64,
    /// Number of times the circuit has opened.
    pub times_opened: u64,
    /// Number of times the circuit has closed from half-open.
    pub times_closed: u64,
    /// Calls recorded in the current window.
    pub calls_in_window: u32,
    /// Failures recorded in the current window.
    pub failures_in_window: u32,
    /// Failure rate of the current window (0.0 to 1.0).
    pub window_failure_rate: f64,
}

impl BreakerMetrics {
    pub(crate) fn from_parts(name: &str, window: &WindowState, lifetime: &LifetimeCounters) -> Self {
        Self {
            name: name.to_string(),
            state: window.state,
            total_calls: lifetime.total_calls,
            successful_calls: lifetime.successful_calls,
            failed_calls: lifetime.failed_calls,
            timeout_calls: lifetime.timeout_calls,
            rejected_calls: lifetime.rejected_calls,
            times_opened: lifetime.times_opened,
            times_closed: lifetime.times_closed,
            calls_in_window: window.calls_in_window,
            failures_in_window: window.failure_count,
            window_failure_rate: window.failure_rate(),
        }
    }

    /// Returns the lifetime success rate (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 1.0;
        }
        self.successful_calls as f64 / self.total_calls as f64
    }

    /// Returns the lifetime failure rate, timeouts included (0.0 to 1.0).
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        (self.failed_calls + self.timeout_calls) as f64 / self.total_calls as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_circuit_state_default() {
        let state = CircuitState::default();
        assert!(state.is_closed());
    }

    #[test]
    fn test_circuit_state_names() {
        assert_eq!(CircuitState::Closed.name(), "closed");
        assert_eq!(CircuitState::Open.name(), "open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
    }

    #[test]
    fn test_transition_resets_counters() {
        let now = Instant::now();
        let mut window = WindowState::new(now);
        window.failure_count = 4;
        window.success_count = 2;
        window.calls_in_window = 9;

        window.transition(CircuitState::Open, now);
        assert_eq!(window.state, CircuitState::Open);
        assert_eq!(window.failure_count, 0);
        assert_eq!(window.success_count, 0);
        assert_eq!(window.calls_in_window, 0);
    }

    #[test]
    fn test_roll_window_is_tumbling() {
        let start = Instant::now();
        let mut window = WindowState::new(start);
        window.failure_count = 2;
        window.calls_in_window = 4;

        window.roll_window(start + Duration::from_millis(5), Duration::from_millis(10));
        assert_eq!(window.calls_in_window, 4);

        window.roll_window(start + Duration::from_millis(11), Duration::from_millis(10));
        assert_eq!(window.calls_in_window, 0);
        assert_eq!(window.failure_count, 0);
    }

    #[test]
    fn test_metrics_rates() {
        let window = WindowState::new(Instant::now());
        let mut lifetime = LifetimeCounters::default();

        let metrics = BreakerMetrics::from_parts("db", &window, &lifetime);
        assert_eq!(metrics.success_rate(), 1.0);
        assert_eq!(metrics.failure_rate(), 0.0);

        lifetime.record_success();
        lifetime.record_success();
        lifetime.record_failure();
        lifetime.record_timeout();

        let metrics = BreakerMetrics::from_parts("db", &window, &lifetime);
        assert_eq!(metrics.total_calls, 4);
        assert_eq!(metrics.successful_calls, 2);
        assert!((metrics.failure_rate() - 0.5).abs() < f64::EPSILON);
    }
}
