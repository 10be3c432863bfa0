//! The resilient wrapper around a one-shot operation.

use crate::audit;
use crate::circuit_breaker::CircuitBreaker;
use crate::core::{
    ArcOperation, ArcUnitSource, ErrorKind, FailureContext, Operation, ResilienceError, RetryKey,
    UnitOfWork, UnitSource,
};
use crate::counter::{ArcRetryCounter, LocalRetryCounter, RetryCounter};
use crate::handler::{CompensationAction, CompensationResult, FailureHandler, FailureHandlingResult};
use crate::manager::handle::{Completion, WorkHandle, WorkTracker};
use crate::manager::scheduler::RetryScheduler;

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;

/// Result of running a single attempt inline.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// The lifecycle ended with this attempt.
    Finished(Completion),
    /// The attempt failed and the rest of the lifecycle runs on the scheduler.
    RetryScheduled {
        /// The attempt that failed.
        attempt: u32,
        /// Delay before the next attempt.
        delay: Duration,
        /// Handle to the rest of the lifecycle.
        handle: WorkHandle,
    },
}

/// Builder for [`ResilientOperation`].
pub struct ResilientOperationBuilder {
    operation: ArcOperation,
    counter: Option<ArcRetryCounter>,
    handler: FailureHandler,
    scheduler: Option<Arc<RetryScheduler>>,
    source: Option<ArcUnitSource>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl ResilientOperationBuilder {
    /// Creates a builder for `operation` with the default handler.
    pub fn new(operation: ArcOperation) -> Self {
        Self {
            operation,
            counter: None,
            handler: FailureHandler::default(),
            scheduler: None,
            source: None,
            breaker: None,
        }
    }

    /// Sets the retry counter. Defaults to a fresh [`LocalRetryCounter`].
    pub fn with_counter(mut self, counter: ArcRetryCounter) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Sets the failure handler.
    pub fn with_handler(mut self, handler: FailureHandler) -> Self {
        self.handler = handler;
        self
    }

    /// Sets the scheduler retries run on. Defaults to a private scheduler.
    pub fn with_scheduler(mut self, scheduler: Arc<RetryScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Sets the source units are acknowledged to and checked against.
    pub fn with_source(mut self, source: ArcUnitSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Gates every attempt through `breaker`.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Builds the wrapper.
    pub fn build(self) -> ResilientOperation {
        ResilientOperation {
            inner: Arc::new(Inner {
                operation: self.operation,
                counter: self
                    .counter
                    .unwrap_or_else(|| Arc::new(LocalRetryCounter::with_defaults())),
                handler: self.handler,
                scheduler: self.scheduler.unwrap_or_default(),
                source: self.source,
                breaker: self.breaker,
            }),
        }
    }
}

/// Applies retry, compensation and optional circuit breaking to an
/// [`Operation`].
///
/// On success the unit's retry counter is reset and the unit is
/// acknowledged to its source. On failure the counter is incremented and
/// the [`FailureHandler`] decides: a retry is scheduled on the
/// [`RetryScheduler`] after the computed delay, or the counter is reset and
/// the compensation runs.
///
/// Counting is keyed by [`UnitOfWork::retry_key`], so redeliveries of the
/// same unit accumulate attempts while a different payload under the same
/// id starts fresh. The wrapper is cheap to clone and safe to use
/// concurrently; it does not deduplicate invocations of the operation.
///
/// # Examples
///
/// ```rust,ignore
/// use breakwater::prelude::*;
/// use std::sync::Arc;
///
/// let wrapper = ResilientOperation::builder(Arc::new(MockOperation::new()))
///     .with_handler(FailureHandler::retry_on_kinds([ErrorKind::Timeout], None))
///     .build();
///
/// let completion = wrapper.execute(UnitOfWork::new("42", "send", b"hi".to_vec())).await?;
/// ```
#[derive(Clone)]
pub struct ResilientOperation {
    inner: Arc<Inner>,
}

struct Inner {
    operation: ArcOperation,
    counter: ArcRetryCounter,
    handler: FailureHandler,
    scheduler: Arc<RetryScheduler>,
    source: Option<ArcUnitSource>,
    breaker: Option<Arc<CircuitBreaker>>,
}

/// What an attempt leads to.
enum Step {
    Done(Result<Completion, ResilienceError>),
    Retry { attempt: u32, delay: Duration },
}

impl ResilientOperation {
    /// Creates a builder.
    pub fn builder(operation: ArcOperation) -> ResilientOperationBuilder {
        ResilientOperationBuilder::new(operation)
    }

    /// Creates a wrapper with a local counter and a private scheduler.
    pub fn new<O: Operation + 'static>(operation: O, handler: FailureHandler) -> Self {
        Self::builder(Arc::new(operation)).with_handler(handler).build()
    }

    /// Returns the wrapped operation's name.
    pub fn name(&self) -> &str {
        self.inner.operation.name()
    }

    /// Returns the failure handler.
    pub fn handler(&self) -> &FailureHandler {
        &self.inner.handler
    }

    /// Returns the retry counter.
    pub fn counter(&self) -> &ArcRetryCounter {
        &self.inner.counter
    }

    /// Returns the scheduler retries run on.
    pub fn scheduler(&self) -> &Arc<RetryScheduler> {
        &self.inner.scheduler
    }

    /// Returns the circuit breaker, if attached.
    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.inner.breaker.as_ref()
    }

    /// Runs one attempt inline.
    ///
    /// If the attempt fails and the handler retries, the remaining attempts
    /// run on the scheduler and the returned outcome carries their handle.
    pub async fn process(&self, unit: UnitOfWork) -> Result<AttemptOutcome, ResilienceError> {
        let unit = Arc::new(unit);
        let key = unit.retry_key();

        match self.inner.attempt(&unit, &key, 0).await {
            Step::Done(result) => result.map(AttemptOutcome::Finished),
            Step::Retry { attempt, delay } => {
                let (tracker, handle) = WorkTracker::new();
                Inner::schedule_retry(&self.inner, unit, key, attempt, delay, tracker);
                Ok(AttemptOutcome::RetryScheduled {
                    attempt,
                    delay,
                    handle,
                })
            }
        }
    }

    /// Runs the whole lifecycle on the scheduler.
    pub fn submit(&self, unit: UnitOfWork) -> Result<WorkHandle, ResilienceError> {
        let (tracker, handle) = WorkTracker::new();
        let unit = Arc::new(unit);
        let key = unit.retry_key();

        tracing::debug!(work_id = %handle.id, unit_id = %unit.id, "Unit submitted");
        let task = Inner::run_attempt(Arc::clone(&self.inner), unit, key, 0, tracker);
        self.inner.scheduler.schedule(Duration::ZERO, task)?;
        Ok(handle)
    }

    /// Runs the whole lifecycle and waits for its result.
    pub async fn execute(&self, unit: UnitOfWork) -> Result<Completion, ResilienceError> {
        self.submit(unit)?.wait().await
    }
}

impl std::fmt::Debug for ResilientOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientOperation")
            .field("operation", &self.inner.operation.name())
            .field("counter", &self.inner.counter.backend())
            .field("handler", &self.inner.handler)
            .field("source", &self.inner.source.as_ref().map(|s| s.id().to_string()))
            .field("breaker", &self.inner.breaker.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

impl Inner {
    /// One attempt followed by the rest of the lifecycle, as a task.
    fn run_attempt(
        inner: Arc<Inner>,
        unit: Arc<UnitOfWork>,
        key: RetryKey,
        prior_attempts: u32,
        tracker: WorkTracker,
    ) -> BoxFuture<'static, ()> {
        async move {
            tracker.set_in_progress(prior_attempts.saturating_add(1));
            match inner.attempt(&unit, &key, prior_attempts).await {
                Step::Done(result) => tracker.finish(result),
                Step::Retry { attempt, delay } => {
                    Inner::schedule_retry(&inner, unit, key, attempt, delay, tracker)
                }
            }
        }
        .boxed()
    }

    fn schedule_retry(
        inner: &Arc<Inner>,
        unit: Arc<UnitOfWork>,
        key: RetryKey,
        attempt: u32,
        delay: Duration,
        tracker: WorkTracker,
    ) {
        tracker.set_retry_scheduled(attempt, delay);
        let task = Inner::run_attempt(Arc::clone(inner), unit, key, attempt, tracker.clone());
        if let Err(e) = inner.scheduler.schedule(delay, task) {
            tracing::warn!(attempt, error = %e, "Could not schedule retry");
            tracker.finish(Err(e));
        }
    }

    /// Runs one attempt and decides what follows.
    async fn attempt(&self, unit: &UnitOfWork, key: &RetryKey, prior_attempts: u32) -> Step {
        let this_attempt = prior_attempts.saturating_add(1);
        let is_retry = prior_attempts > 0;

        if is_retry && !self.still_pending(unit).await {
            return Step::Done(Ok(self.abandon(unit, key, prior_attempts, "unit left its source").await));
        }

        if let Some(breaker) = &self.breaker {
            if let Err(e) = breaker.try_acquire() {
                tracing::debug!(unit_id = %unit.id, breaker = %breaker.name(), "Attempt denied");
                return Step::Done(Err(e));
            }
        }

        let error = match self.operation.process(unit).await {
            Ok(()) => {
                if let Some(breaker) = &self.breaker {
                    breaker.record_success();
                }
                self.reset_counter(key).await;
                self.acknowledge(unit).await;
                tracing::debug!(unit_id = %unit.id, attempts = this_attempt, "Unit processed");
                return Step::Done(Ok(Completion::Completed {
                    attempts: this_attempt,
                }));
            }
            Err(error) => error,
        };

        // A vanished unit says nothing about the dependency's health
        if is_retry && error.is_kind(&ErrorKind::NotFound) {
            if let Some(breaker) = &self.breaker {
                breaker.record_success();
            }
            return Step::Done(Ok(self.abandon(unit, key, this_attempt, "unit not found").await));
        }

        if let Some(breaker) = &self.breaker {
            breaker.record_failure(&error);
        }

        let attempt = match self.counter.increment(key.as_str()).await {
            Ok(count) => u32::try_from(count).unwrap_or(u32::MAX),
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    backend = %self.counter.backend(),
                    error = %e,
                    "Retry counter increment failed, using in-process attempt number"
                );
                this_attempt
            }
        };

        let ctx = FailureContext::new(
            unit.clone(),
            error,
            attempt,
            self.handler.policy().max_attempts,
        );

        match self.handler.handle(&ctx) {
            FailureHandlingResult::Retry { delay } => {
                audit::emit_retry_scheduled(&ctx, delay);
                Step::Retry { attempt, delay }
            }
            FailureHandlingResult::GiveUp { compensation } => {
                self.reset_counter(key).await;
                audit::emit_gave_up(&ctx, compensation.as_ref().map(|c| c.name()));

                let recovered = match &compensation {
                    Some(action) => match action.execute(&ctx).await {
                        Ok(result) => result == CompensationResult::Recovered,
                        Err(e) => {
                            audit::emit_compensation_failed(&ctx, action.name(), &e);
                            false
                        }
                    },
                    None => false,
                };

                if recovered {
                    Step::Done(Ok(Completion::Recovered { attempts: attempt }))
                } else {
                    Step::Done(Err(ResilienceError::Failed {
                        action: ctx.action().to_string(),
                        attempts: attempt,
                        error: ctx.error,
                    }))
                }
            }
        }
    }

    async fn still_pending(&self, unit: &UnitOfWork) -> bool {
        let Some(source) = &self.source else {
            return true;
        };
        match source.is_pending(unit).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(unit_id = %unit.id, source = %source.id(), error = %e, "Could not check unit status");
                true
            }
        }
    }

    async fn abandon(&self, unit: &UnitOfWork, key: &RetryKey, attempts: u32, reason: &str) -> Completion {
        self.reset_counter(key).await;
        audit::emit_unit_abandoned(unit, attempts, reason);
        Completion::Abandoned { attempts }
    }

    async fn reset_counter(&self, key: &RetryKey) {
        if let Err(e) = self.counter.reset(key.as_str()).await {
            tracing::warn!(key = %key, backend = %self.counter.backend(), error = %e, "Retry counter reset failed");
        }
    }

    async fn acknowledge(&self, unit: &UnitOfWork) {
        if let Some(source) = &self.source {
            if let Err(e) = source.acknowledge(unit).await {
                tracing::warn!(unit_id = %unit.id, source = %source.id(), error = %e, "Acknowledgement failed");
            }
        }
    }
}
