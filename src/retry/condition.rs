//! Retry-eligibility predicates over operation errors.

use crate::core::{ErrorKind, OperationError};

use std::fmt;
use std::sync::Arc;

type Predicate = dyn Fn(&OperationError) -> bool + Send + Sync;

/// Decides whether a failed attempt may be retried.
///
/// Kind-based conditions inspect the error and its directly wrapped cause,
/// never deeper.
#[derive(Clone)]
pub struct RetryCondition {
    predicate: Arc<Predicate>,
    description: String,
}

impl RetryCondition {
    /// Retries every error.
    pub fn always() -> Self {
        Self::from_fn("always", |_| true)
    }

    /// Retries no error.
    pub fn never() -> Self {
        Self::from_fn("never", |_| false)
    }

    /// Retries only errors of the given kinds.
    pub fn on_kinds(kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        let kinds: Vec<ErrorKind> = kinds.into_iter().collect();
        let description = format!("on {}", join_kinds(&kinds));
        Self::from_fn(description, move |error| error.matches_any(&kinds))
    }

    /// Retries every error except those of the given kinds.
    pub fn except_kinds(kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        let kinds: Vec<ErrorKind> = kinds.into_iter().collect();
        let description = format!("except {}", join_kinds(&kinds));
        Self::from_fn(description, move |error| !error.matches_any(&kinds))
    }

    /// Retries network-level errors only.
    pub fn network_errors() -> Self {
        Self::on_kinds(ErrorKind::network_kinds())
    }

    /// Builds a condition from an arbitrary predicate.
    pub fn from_fn<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&OperationError) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            description: description.into(),
        }
    }

    /// Retries only if both conditions hold.
    pub fn and(self, other: RetryCondition) -> Self {
        let description = format!("{} and {}", self.description, other.description);
        Self::from_fn(description, move |error| self.test(error) && other.test(error))
    }

    /// Evaluates the condition.
    pub fn test(&self, error: &OperationError) -> bool {
        (self.predicate)(error)
    }

    /// Returns a human-readable description of the condition.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Default for RetryCondition {
    fn default() -> Self {
        Self::always()
    }
}

impl fmt::Debug for RetryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RetryCondition")
            .field(&self.description)
            .finish()
    }
}

fn join_kinds(kinds: &[ErrorKind]) -> String {
    let names: Vec<&str> = kinds.iter().map(ErrorKind::name).collect();
    format!("[{}]", names.join(", "))
}
