//! Pre-configured wrappers.

use crate::circuit_breaker::CircuitBreaker;
use crate::core::{ArcOperation, ArcUnitSource, ResilienceError};
use crate::counter::{ArcRetryCounter, LocalRetryCounter, RetryCounter};
use crate::handler::{ArcCompensation, FailureHandler, LogCompensation};
use crate::manager::scheduler::RetryScheduler;
use crate::manager::wrapper::ResilientOperation;
use crate::retry::RetryPolicy;

use std::sync::Arc;

/// Builds [`ResilientOperation`]s that share one counter and one scheduler.
///
/// Each constructor pairs an operation with a named retry preset and the
/// factory's compensation (logging by default). Create one factory at
/// startup and call [`shutdown`](Self::shutdown) on teardown.
///
/// # Examples
///
/// ```rust
/// use breakwater::backends::MockOperation;
/// use breakwater::manager::ResilienceFactory;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let factory = ResilienceFactory::new();
/// let wrapper = factory.fast(Arc::new(MockOperation::new()));
/// assert_eq!(wrapper.handler().policy().max_attempts, 5);
/// factory.shutdown();
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ResilienceFactory {
    counter: ArcRetryCounter,
    scheduler: Arc<RetryScheduler>,
    compensation: ArcCompensation,
    source: Option<ArcUnitSource>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl ResilienceFactory {
    /// Creates a factory with a local counter and a new scheduler.
    pub fn new() -> Self {
        Self::with_counter(Arc::new(LocalRetryCounter::with_defaults()))
    }

    /// Creates a factory around `counter`.
    pub fn with_counter(counter: ArcRetryCounter) -> Self {
        Self {
            counter,
            scheduler: Arc::new(RetryScheduler::new()),
            compensation: Arc::new(LogCompensation),
            source: None,
            breaker: None,
        }
    }

    /// Shares `scheduler` instead of the factory's own.
    pub fn with_scheduler(mut self, scheduler: Arc<RetryScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Sets the compensation used by the preset constructors.
    pub fn with_compensation(mut self, compensation: ArcCompensation) -> Self {
        self.compensation = compensation;
        self
    }

    /// Attaches a unit source to every wrapper built.
    pub fn with_source(mut self, source: ArcUnitSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Gates every wrapper built through `breaker`.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Returns the shared counter.
    pub fn counter(&self) -> &ArcRetryCounter {
        &self.counter
    }

    /// Returns the shared scheduler.
    pub fn scheduler(&self) -> &Arc<RetryScheduler> {
        &self.scheduler
    }

    /// 3 attempts, exponential backoff from 1s.
    pub fn standard(&self, operation: ArcOperation) -> ResilientOperation {
        self.with_policy(operation, RetryPolicy::default())
    }

    /// 5 attempts, exponential backoff from 100ms.
    pub fn fast(&self, operation: ArcOperation) -> ResilientOperation {
        self.with_policy(operation, RetryPolicy::fast())
    }

    /// 2 attempts, exponential backoff from 5s.
    pub fn conservative(&self, operation: ArcOperation) -> ResilientOperation {
        self.with_policy(operation, RetryPolicy::conservative())
    }

    /// Gives up on the first failure.
    pub fn no_retry(&self, operation: ArcOperation) -> ResilientOperation {
        self.with_policy(operation, RetryPolicy::no_retry())
    }

    /// Retries only timeouts, connection errors and unavailability.
    pub fn network_errors_only(&self, operation: ArcOperation) -> ResilientOperation {
        self.with_policy(operation, RetryPolicy::network_errors_only())
    }

    /// Fully custom policy and compensation.
    pub fn custom(
        &self,
        operation: ArcOperation,
        policy: RetryPolicy,
        compensation: ArcCompensation,
    ) -> ResilientOperation {
        self.build(operation, FailureHandler::with_policy(policy, compensation))
    }

    /// Stops the shared scheduler, aborting pending retries.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Stops the scheduler and closes the counter.
    pub async fn close(&self) -> Result<(), ResilienceError> {
        self.shutdown();
        self.counter.close().await
    }

    fn with_policy(&self, operation: ArcOperation, policy: RetryPolicy) -> ResilientOperation {
        self.custom(operation, policy, Arc::clone(&self.compensation))
    }

    fn build(&self, operation: ArcOperation, handler: FailureHandler) -> ResilientOperation {
        let mut builder = ResilientOperation::builder(operation)
            .with_counter(Arc::clone(&self.counter))
            .with_scheduler(Arc::clone(&self.scheduler))
            .with_handler(handler);
        if let Some(source) = &self.source {
            builder = builder.with_source(Arc::clone(source));
        }
        if let Some(breaker) = &self.breaker {
            builder = builder.with_circuit_breaker(Arc::clone(breaker));
        }
        builder.build()
    }
}

impl Default for ResilienceFactory {
    fn default() -> Self {
        Self::new()
    }
}
