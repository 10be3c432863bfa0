//! # Breakwater
//!
//! Circuit breaking, counted retries and compensation for one-shot
//! operations such as message handlers and outbound calls.
//!
//! ## Overview
//!
//! Breakwater wraps an operation that processes a unit of work so that:
//!
//! - Calls to an unhealthy dependency are rejected fast by a circuit breaker
//! - Failed attempts are counted per unit, locally or in a shared store
//! - Retries are scheduled with configurable backoff and jitter
//! - Exhausted units trigger a compensation action (logging, removal, fallback)
//! - Every transition and give-up is recorded as a structured audit event
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use breakwater::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let breaker = Arc::new(CircuitBreaker::new("payments", CircuitBreakerConfig::default()));
//!
//!     let wrapper = ResilientOperation::builder(Arc::new(MockOperation::new()))
//!         .with_handler(FailureHandler::new(RetryPolicy::fast()))
//!         .with_circuit_breaker(breaker)
//!         .build();
//!
//!     let unit = UnitOfWork::new("order-42", "charge", b"{}".to_vec());
//!     let completion = wrapper.execute(unit).await?;
//!     println!("done after {} attempt(s)", completion.attempts());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several layers:
//!
//! - **Core**: Units of work, failure contexts, seams and error handling
//! - **Circuit Breaker**: Per-dependency call gating
//! - **Counter**: Local, shared and hybrid retry counters
//! - **Retry**: Backoff strategies, retry conditions and policies
//! - **Handler**: Retry decisions and compensation actions
//! - **Manager**: The resilient wrapper, retry scheduling and presets
//! - **Settings**: Serializable configuration
//! - **Backends**: In-memory store and mocks
//! - **Audit**: Structured logging of breaker and lifecycle events

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod backends;
pub mod circuit_breaker;
pub mod core;
pub mod counter;
pub mod handler;
pub mod manager;
pub mod retry;
pub mod settings;

// Re-export commonly used types at the crate root
pub use crate::core::{
    ErrorKind, FailureContext, Operation, OperationError, ResilienceError, ResilienceResult,
    RetryKey, UnitOfWork, UnitSource,
};

pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use crate::counter::{HybridRetryCounter, LocalRetryCounter, RetryCounter, SharedRetryCounter};
pub use crate::handler::{CompensationAction, CompensationResult, FailureHandler};
pub use crate::manager::{Completion, ResilienceFactory, ResilientOperation, WorkHandle};
pub use crate::retry::{BackoffStrategy, RetryCondition, RetryPolicy};
pub use crate::settings::{CircuitBreakerSettings, RetryPolicySettings};

/// Prelude module for convenient imports.
///
/// ```rust
/// use breakwater::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backends::{InMemoryCounterStore, MockOperation, MockUnitSource};
    pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use crate::core::{
        ErrorKind, FailureContext, Operation, OperationError, ResilienceError, UnitOfWork,
        UnitSource,
    };
    pub use crate::counter::{
        HybridRetryCounter, LocalRetryCounter, RetryCounter, SharedRetryCounter,
    };
    pub use crate::handler::{
        CompensationAction, CompensationResult, FailureHandler, FnCompensation, LogCompensation,
        RemoveUnitCompensation,
    };
    pub use crate::manager::{Completion, ResilienceFactory, ResilientOperation, WorkHandle};
    pub use crate::retry::{BackoffStrategy, RetryCondition, RetryPolicy};
}
