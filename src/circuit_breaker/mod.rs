//! Circuit breaker for protected operations.
//!
//! The circuit breaker pattern prevents cascading failures by temporarily
//! stopping traffic to a failing dependency and periodically probing it to
//! detect recovery.
//!
//! ## States
//!
//! - **Closed**: Normal operation; calls pass through.
//! - **Open**: Dependency is failing; calls are rejected immediately.
//! - **Half-Open**: Probing the dependency to see if it has recovered.
//!
//! Failure rate is computed over a tumbling window: once
//! `sliding_window_size` has elapsed, calls and failures are counted from
//! zero again.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use breakwater::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::default()
//!     .with_failure_rate_threshold(0.5)
//!     .with_wait_duration_in_open_state(Duration::from_secs(30));
//!
//! let breaker = CircuitBreaker::new("payments", config);
//! let receipt = breaker.call(charge(order)).await?;
//! ```

mod breaker;
mod config;
mod state;

pub use breaker::CircuitBreaker;
pub use config::{CircuitBreakerConfig, FailurePolicy};
pub use state::{BreakerMetrics, CircuitState};
