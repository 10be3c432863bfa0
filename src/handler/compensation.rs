//! Compensation actions run when retries are exhausted.

use crate::audit;
use crate::core::{ArcUnitSource, FailureContext, ResilienceError, UnitOfWork, UnitSource};

use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

/// What a compensation action did to the outcome of the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompensationResult {
    /// The failure stands; the caller sees the last error.
    #[default]
    Propagate,
    /// The action produced a fallback; the unit counts as handled.
    Recovered,
}

impl CompensationResult {
    /// Returns `true` if the action recovered the unit.
    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered)
    }
}

/// Side effect executed once a unit of work is given up on.
///
/// # Implementation Notes
///
/// - `execute` runs once per exhausted unit, after its retry counter has
///   been reset.
/// - Errors are logged by the caller and never replace the unit's own
///   failure.
#[async_trait]
pub trait CompensationAction: Send + Sync + Debug {
    /// Returns the name of this action, for logging.
    fn name(&self) -> &str;

    /// Runs the action for the failed unit.
    async fn execute(&self, ctx: &FailureContext) -> Result<CompensationResult, ResilienceError>;
}

/// An arc-wrapped compensation action for shared ownership.
pub type ArcCompensation = Arc<dyn CompensationAction>;

/// Logs the exhausted unit and lets the failure propagate.
#[derive(Debug, Clone, Default)]
pub struct LogCompensation;

impl LogCompensation {
    /// Creates a new logging action.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CompensationAction for LogCompensation {
    fn name(&self) -> &str {
        "log"
    }

    async fn execute(&self, ctx: &FailureContext) -> Result<CompensationResult, ResilienceError> {
        tracing::error!(
            unit_id = %ctx.unit_id(),
            action = %ctx.action(),
            source = ?ctx.source(),
            attempt = ctx.attempt,
            error = %ctx.error,
            "Unit of work failed permanently"
        );
        Ok(CompensationResult::Propagate)
    }
}

/// Removes the exhausted unit from its source so it is not redelivered.
#[derive(Debug, Clone)]
pub struct RemoveUnitCompensation {
    source: ArcUnitSource,
}

impl RemoveUnitCompensation {
    /// Creates an action removing units from `source`.
    pub fn new(source: ArcUnitSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl CompensationAction for RemoveUnitCompensation {
    fn name(&self) -> &str {
        "remove-unit"
    }

    async fn execute(&self, ctx: &FailureContext) -> Result<CompensationResult, ResilienceError> {
        self.source.remove(&ctx.unit).await?;
        tracing::info!(
            unit_id = %ctx.unit_id(),
            source = %self.source.id(),
            "Removed exhausted unit from source"
        );
        Ok(CompensationResult::Propagate)
    }
}

/// Adapts an async closure into a [`CompensationAction`].
///
/// The closure receives the failed unit and the last error message. Use it
/// for dead-lettering or for producing a fallback:
///
/// ```rust
/// use breakwater::handler::{CompensationResult, FnCompensation};
///
/// let fallback = FnCompensation::new("fallback", |_unit, _error| async {
///     Ok(CompensationResult::Recovered)
/// });
/// ```
pub struct FnCompensation<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnCompensation<F>
where
    F: Fn(UnitOfWork, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<CompensationResult, ResilienceError>> + Send,
{
    /// Creates an action named `name` that runs `f`.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Debug for FnCompensation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCompensation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> CompensationAction for FnCompensation<F>
where
    F: Fn(UnitOfWork, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<CompensationResult, ResilienceError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &FailureContext) -> Result<CompensationResult, ResilienceError> {
        (self.f)(ctx.unit.clone(), ctx.error.to_string()).await
    }
}

/// Runs several actions in sequence, best effort.
///
/// A failing action is logged and the remaining actions still run; the
/// composite itself never fails. The result is `Recovered` if any action
/// recovered the unit.
#[derive(Debug, Clone, Default)]
pub struct CompositeCompensation {
    actions: Vec<ArcCompensation>,
}

impl CompositeCompensation {
    /// Creates a composite over `actions`, run in order.
    pub fn new(actions: Vec<ArcCompensation>) -> Self {
        Self { actions }
    }

    /// Appends an action.
    pub fn with_action(mut self, action: ArcCompensation) -> Self {
        self.actions.push(action);
        self
    }

    /// Returns the number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if there are no actions.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[async_trait]
impl CompensationAction for CompositeCompensation {
    fn name(&self) -> &str {
        "composite"
    }

    async fn execute(&self, ctx: &FailureContext) -> Result<CompensationResult, ResilienceError> {
        let mut result = CompensationResult::Propagate;
        for action in &self.actions {
            match action.execute(ctx).await {
                Ok(CompensationResult::Recovered) => result = CompensationResult::Recovered,
                Ok(CompensationResult::Propagate) => {}
                Err(e) => audit::emit_compensation_failed(ctx, action.name(), &e),
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockUnitSource;
    use crate::core::OperationError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn context() -> FailureContext {
        let unit = UnitOfWork::new("u-1", "charge", b"{}".to_vec());
        FailureContext::new(unit, OperationError::unavailable("down"), 3, 3)
    }

    #[derive(Debug)]
    struct Failing;

    #[async_trait]
    impl CompensationAction for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn execute(&self, _ctx: &FailureContext) -> Result<CompensationResult, ResilienceError> {
            Err(ResilienceError::compensation("failing", "boom"))
        }
    }

    #[tokio::test]
    async fn test_log_compensation_propagates() {
        let result = LogCompensation::new().execute(&context()).await.unwrap();
        assert_eq!(result, CompensationResult::Propagate);
    }

    #[tokio::test]
    async fn test_remove_unit_compensation() {
        let source = Arc::new(MockUnitSource::new("queue"));
        let ctx = context();
        source.push(&ctx.unit);

        let action = RemoveUnitCompensation::new(source.clone());
        action.execute(&ctx).await.unwrap();

        assert_eq!(source.removed(), vec!["u-1".to_string()]);
        assert_eq!(source.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_fn_compensation_sees_unit_and_error() {
        let action = FnCompensation::new("check", |unit: UnitOfWork, error: String| async move {
            assert_eq!(unit.id, "u-1");
            assert!(error.contains("down"));
            Ok(CompensationResult::Recovered)
        });
        let result = action.execute(&context()).await.unwrap();
        assert!(result.is_recovered());
    }

    #[tokio::test]
    async fn test_composite_runs_all_despite_failure() {
        let runs = Arc::new(AtomicU32::new(0));
        let counted = |runs: Arc<AtomicU32>, result: CompensationResult| -> ArcCompensation {
            Arc::new(FnCompensation::new("count", move |_, _| {
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(result)
                }
            }))
        };

        let composite = CompositeCompensation::new(vec![
            counted(runs.clone(), CompensationResult::Propagate),
            Arc::new(Failing),
            counted(runs.clone(), CompensationResult::Propagate),
        ]);
        assert_eq!(composite.len(), 3);

        let result = composite.execute(&context()).await.unwrap();
        assert_eq!(result, CompensationResult::Propagate);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_composite_recovered_if_any_recovers() {
        let composite = CompositeCompensation::default()
            .with_action(Arc::new(LogCompensation))
            .with_action(Arc::new(FnCompensation::new("fallback", |_, _| async {
                Ok(CompensationResult::Recovered)
            })))
            .with_action(Arc::new(Failing));

        let result = composite.execute(&context()).await.unwrap();
        assert!(result.is_recovered());
    }
}
