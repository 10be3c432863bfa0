//! Core traits for the breakwater library.
//!
//! This module defines the seams to the outside world: the [`Operation`]
//! being protected and the [`UnitSource`] the units of work come from.

use crate::core::error::{OperationError, ResilienceError};
use crate::core::unit::UnitOfWork;

use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

/// A one-shot "process this unit of work" operation.
///
/// # Implementation Notes
///
/// - Implementations must be `Send + Sync`; one instance is shared by every
///   attempt and every concurrently processed unit.
/// - The wrapper does not deduplicate: the same unit may be processed again
///   after a failure, so `process` should be idempotent where it matters.
/// - Implementations should never panic; failures are returned as
///   [`OperationError`] with a kind the retry and breaker predicates can
///   classify.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use breakwater::core::{Operation, OperationError, UnitOfWork};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct SendEmail;
///
/// #[async_trait]
/// impl Operation for SendEmail {
///     fn name(&self) -> &str {
///         "send-email"
///     }
///
///     async fn process(&self, unit: &UnitOfWork) -> Result<(), OperationError> {
///         // Deliver the message...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Operation: Send + Sync + Debug {
    /// Returns the name of this operation.
    fn name(&self) -> &str;

    /// Processes the unit of work once.
    async fn process(&self, unit: &UnitOfWork) -> Result<(), OperationError>;
}

/// The transport collaborator a unit of work was pulled from.
///
/// The wrapper never reimplements transport primitives; it only calls these.
#[async_trait]
pub trait UnitSource: Send + Sync + Debug {
    /// Returns the identifier of this source.
    fn id(&self) -> &str;

    /// Acknowledges a successfully processed unit.
    async fn acknowledge(&self, unit: &UnitOfWork) -> Result<(), ResilienceError>;

    /// Removes a unit from the source without processing it.
    async fn remove(&self, unit: &UnitOfWork) -> Result<(), ResilienceError>;

    /// Returns `true` while the unit is still pending in the source.
    ///
    /// A unit that was independently acknowledged or removed is no longer
    /// pending; scheduled retries for it are abandoned.
    async fn is_pending(&self, _unit: &UnitOfWork) -> Result<bool, ResilienceError> {
        Ok(true)
    }
}

/// An arc-wrapped operation for shared ownership.
pub type ArcOperation = Arc<dyn Operation>;

/// An arc-wrapped unit source for shared ownership.
pub type ArcUnitSource = Arc<dyn UnitSource>;

/// Adapts an async closure into an [`Operation`].
///
/// ```rust
/// use breakwater::core::{FnOperation, OperationError};
///
/// let op = FnOperation::new("noop", |_unit| async { Ok::<(), OperationError>(()) });
/// ```
pub struct FnOperation<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnOperation<F>
where
    F: Fn(UnitOfWork) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), OperationError>> + Send,
{
    /// Creates an operation named `name` that runs `f` for each attempt.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Debug for FnOperation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOperation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Operation for FnOperation<F>
where
    F: Fn(UnitOfWork) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), OperationError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, unit: &UnitOfWork) -> Result<(), OperationError> {
        (self.f)(unit.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_fn_operation_runs_closure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let op = FnOperation::new("count", move |unit: UnitOfWork| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if unit.payload.is_empty() {
                    Err(OperationError::invalid_input("empty payload"))
                } else {
                    Ok(())
                }
            }
        });

        assert_eq!(op.name(), "count");
        assert!(op.process(&UnitOfWork::new("1", "count", b"x".to_vec())).await.is_ok());
        assert!(op.process(&UnitOfWork::new("2", "count", Vec::new())).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
