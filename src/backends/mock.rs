//! Mock operation and unit source for testing.
//!
//! This module provides configurable collaborators that can be used in
//! tests to simulate failing operations and transports without a real
//! downstream service.

use crate::core::{ErrorKind, Operation, OperationError, ResilienceError, UnitOfWork, UnitSource};

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;

/// A mock operation for testing purposes.
///
/// The mock can be configured to fail its first N invocations, to fail
/// always, or to fail specific unit ids. Every invocation is counted and
/// timestamped.
///
/// # Examples
///
/// ```rust
/// use breakwater::backends::MockOperation;
/// use breakwater::core::ErrorKind;
/// use std::time::Duration;
///
/// // Succeeds on every call
/// let op = MockOperation::new();
///
/// // Fails twice with a connection error, then succeeds
/// let op = MockOperation::new()
///     .failing_first(2)
///     .with_error_kind(ErrorKind::Connection);
///
/// // Always fails after a simulated delay
/// let op = MockOperation::always_failing(ErrorKind::Unavailable)
///     .with_latency(Duration::from_millis(10));
/// ```
#[derive(Debug)]
pub struct MockOperation {
    /// Name of this operation instance.
    name: String,
    /// Number of leading invocations that fail.
    fail_first: u32,
    /// Whether every invocation fails.
    always_fail: bool,
    /// Kind of the simulated error.
    error_kind: ErrorKind,
    /// Unit ids that always fail, with their error kind.
    failing_units: RwLock<HashMap<String, ErrorKind>>,
    /// Simulated latency for invocations.
    latency: Option<Duration>,
    /// Counter for invocations.
    invocations: AtomicU32,
    /// When each invocation started.
    invoked_at: RwLock<Vec<Instant>>,
}

impl MockOperation {
    /// Creates a mock operation that always succeeds.
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            fail_first: 0,
            always_fail: false,
            error_kind: ErrorKind::Unavailable,
            failing_units: RwLock::new(HashMap::new()),
            latency: None,
            invocations: AtomicU32::new(0),
            invoked_at: RwLock::new(Vec::new()),
        }
    }

    /// Creates a mock operation that fails every call with `kind`.
    pub fn always_failing(kind: ErrorKind) -> Self {
        Self {
            always_fail: true,
            error_kind: kind,
            ..Self::new()
        }
    }

    /// Sets the name of this operation.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fails the first `count` invocations.
    pub fn failing_first(mut self, count: u32) -> Self {
        self.fail_first = count;
        self
    }

    /// Sets the kind of the simulated error.
    pub fn with_error_kind(mut self, kind: ErrorKind) -> Self {
        self.error_kind = kind;
        self
    }

    /// Sets the simulated latency for invocations.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes every invocation for `unit_id` fail with `kind`.
    pub fn fail_unit(&self, unit_id: impl Into<String>, kind: ErrorKind) {
        self.failing_units
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(unit_id.into(), kind);
    }

    /// Returns the number of invocations performed.
    pub fn invocation_count(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Returns the start instant of every invocation, in order.
    pub fn invocation_times(&self) -> Vec<Instant> {
        self.invoked_at
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn simulated_error(&self, unit: &UnitOfWork, invocation: u32) -> Option<OperationError> {
        if let Some(kind) = self
            .failing_units
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&unit.id)
        {
            return Some(OperationError::new(kind.clone(), format!("unit {} rejected", unit.id)));
        }
        if self.always_fail || invocation <= self.fail_first {
            return Some(OperationError::new(
                self.error_kind.clone(),
                format!("simulated failure #{invocation}"),
            ));
        }
        None
    }
}

impl Default for MockOperation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operation for MockOperation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, unit: &UnitOfWork) -> Result<(), OperationError> {
        let invocation = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        self.invoked_at
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Instant::now());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match self.simulated_error(unit, invocation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// A mock unit source for testing purposes.
///
/// Units are pending until acknowledged or removed, either by the
/// wrapper or externally through [`MockUnitSource::take`].
#[derive(Debug)]
pub struct MockUnitSource {
    /// Identifier of this source.
    id: String,
    /// Ids of units still pending.
    pending: RwLock<HashSet<String>>,
    /// Ids of acknowledged units, in order.
    acknowledged: RwLock<Vec<String>>,
    /// Ids of removed units, in order.
    removed: RwLock<Vec<String>>,
    /// Whether calls fail.
    failing: AtomicBool,
}

impl MockUnitSource {
    /// Creates an empty source named `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pending: RwLock::new(HashSet::new()),
            acknowledged: RwLock::new(Vec::new()),
            removed: RwLock::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Marks `unit` as pending.
    pub fn push(&self, unit: &UnitOfWork) {
        self.pending
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(unit.id.clone());
    }

    /// Removes a unit outside the wrapper, as another consumer would.
    pub fn take(&self, unit_id: &str) -> bool {
        self.pending
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(unit_id)
    }

    /// Makes every subsequent call fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the ids of acknowledged units.
    pub fn acknowledged(&self) -> Vec<String> {
        self.acknowledged
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns the ids of removed units.
    pub fn removed(&self) -> Vec<String> {
        self.removed
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns the number of pending units.
    pub fn pending_count(&self) -> usize {
        self.pending
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn check_failing(&self) -> Result<(), ResilienceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ResilienceError::source_failed(&self.id, "simulated failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitSource for MockUnitSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn acknowledge(&self, unit: &UnitOfWork) -> Result<(), ResilienceError> {
        self.check_failing()?;
        self.take(&unit.id);
        self.acknowledged
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(unit.id.clone());
        Ok(())
    }

    async fn remove(&self, unit: &UnitOfWork) -> Result<(), ResilienceError> {
        self.check_failing()?;
        self.take(&unit.id);
        self.removed
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(unit.id.clone());
        Ok(())
    }

    async fn is_pending(&self, unit: &UnitOfWork) -> Result<bool, ResilienceError> {
        self.check_failing()?;
        Ok(self
            .pending
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&unit.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str) -> UnitOfWork {
        UnitOfWork::new(id, "mock", b"payload".to_vec())
    }

    #[tokio::test]
    async fn test_mock_operation_succeeds() {
        let op = MockOperation::new();
        assert!(op.process(&unit("1")).await.is_ok());
        assert_eq!(op.invocation_count(), 1);
        assert_eq!(op.invocation_times().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_operation_fails_first_n() {
        let op = MockOperation::new()
            .failing_first(2)
            .with_error_kind(ErrorKind::Connection);

        let first = op.process(&unit("1")).await.unwrap_err();
        assert_eq!(first.kind(), &ErrorKind::Connection);
        assert!(op.process(&unit("1")).await.is_err());
        assert!(op.process(&unit("1")).await.is_ok());
        assert_eq!(op.invocation_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_operation_fails_specific_unit() {
        let op = MockOperation::new();
        op.fail_unit("bad", ErrorKind::InvalidInput);

        assert!(op.process(&unit("good")).await.is_ok());
        let error = op.process(&unit("bad")).await.unwrap_err();
        assert_eq!(error.kind(), &ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_mock_source_tracks_units() {
        let source = MockUnitSource::new("queue");
        let a = unit("a");
        let b = unit("b");
        source.push(&a);
        source.push(&b);
        assert_eq!(source.pending_count(), 2);

        source.acknowledge(&a).await.unwrap();
        source.remove(&b).await.unwrap();

        assert_eq!(source.acknowledged(), vec!["a".to_string()]);
        assert_eq!(source.removed(), vec!["b".to_string()]);
        assert!(!source.is_pending(&a).await.unwrap());
        assert_eq!(source.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_source_failure_injection() {
        let source = MockUnitSource::new("queue");
        source.set_failing(true);
        let result = source.acknowledge(&unit("a")).await;
        assert!(matches!(result, Err(ResilienceError::Source { .. })));
    }
}
