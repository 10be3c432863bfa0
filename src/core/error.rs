//! Error types for the breakwater library.
//!
//! Two layers of errors exist:
//!
//! - [`OperationError`] is what a wrapped operation reports when an attempt
//!   fails. It carries a categorized [`ErrorKind`] and at most one wrapped
//!   cause, which is all the retry and breaker predicates ever inspect.
//! - [`ResilienceError`] is what the library itself returns to callers.
//!
//! The library never panics; all errors are returned as `Result` values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Category of a failed attempt.
///
/// Kinds replace type-hierarchy checks: predicates match on a kind, never on
/// a concrete error type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The operation timed out.
    Timeout,
    /// A connection could not be established or was dropped.
    Connection,
    /// The dependency is unavailable.
    Unavailable,
    /// The dependency refused the call due to rate limiting.
    RateLimited,
    /// The target of the operation no longer exists.
    NotFound,
    /// The input was rejected as invalid.
    InvalidInput,
    /// The operation conflicted with concurrent state.
    Conflict,
    /// An unexpected internal failure.
    Internal,
    /// An application-defined kind.
    Named(String),
}

impl ErrorKind {
    /// Creates an application-defined kind.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Returns `true` for kinds that indicate a network-level problem.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connection | Self::Unavailable)
    }

    /// Returns the name of the kind.
    pub fn name(&self) -> &str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Unavailable => "unavailable",
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::InvalidInput => "invalid_input",
            Self::Conflict => "conflict",
            Self::Internal => "internal",
            Self::Named(name) => name,
        }
    }

    /// Parses a kind from its name. Unknown names become [`ErrorKind::Named`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "timeout" => Self::Timeout,
            "connection" => Self::Connection,
            "unavailable" => Self::Unavailable,
            "rate_limited" => Self::RateLimited,
            "not_found" => Self::NotFound,
            "invalid_input" => Self::InvalidInput,
            "conflict" => Self::Conflict,
            "internal" => Self::Internal,
            other => Self::Named(other.to_string()),
        }
    }

    /// The kinds considered network errors.
    pub fn network_kinds() -> Vec<ErrorKind> {
        vec![Self::Timeout, Self::Connection, Self::Unavailable]
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The error a wrapped operation reports for a failed attempt.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct OperationError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<Box<OperationError>>,
}

impl OperationError {
    /// Creates a new error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Wraps `cause` as the underlying reason of this error.
    pub fn with_cause(mut self, cause: OperationError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Creates a `Timeout` error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Creates a `Connection` error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// Creates an `Unavailable` error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    /// Creates a `NotFound` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Creates an `InvalidInput` error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns the message of this error.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the wrapped cause, if any.
    pub fn cause(&self) -> Option<&OperationError> {
        self.cause.as_deref()
    }

    /// Returns `true` if the top-level kind is `kind`.
    pub fn is_kind(&self, kind: &ErrorKind) -> bool {
        &self.kind == kind
    }

    /// Returns `true` if the top-level kind, or the kind of the directly
    /// wrapped cause, is `kind`. Deeper causes are not inspected.
    pub fn matches_kind(&self, kind: &ErrorKind) -> bool {
        self.is_kind(kind) || self.cause().is_some_and(|cause| cause.is_kind(kind))
    }

    /// Returns `true` if [`matches_kind`](Self::matches_kind) holds for any of `kinds`.
    pub fn matches_any(&self, kinds: &[ErrorKind]) -> bool {
        kinds.iter().any(|kind| self.matches_kind(kind))
    }
}

/// The main error type returned by the library.
#[derive(Debug, Clone, Error)]
pub enum ResilienceError {
    /// The operation kept failing and the failure handler gave up.
    #[error("action '{action}' failed after {attempts} attempt(s): {error}")]
    Failed {
        /// Logical action name of the unit of work.
        action: String,
        /// Number of attempts made.
        attempts: u32,
        /// The error of the last attempt.
        #[source]
        error: OperationError,
    },

    /// The circuit breaker refused the call.
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen {
        /// Name of the breaker.
        name: String,
        /// When the circuit might admit calls again (if known).
        recovery_hint: Option<String>,
    },

    /// A breaker-guarded call exceeded the configured timeout.
    #[error("call through circuit breaker '{name}' timed out after {elapsed:?}")]
    Timeout {
        /// Name of the breaker.
        name: String,
        /// The timeout that elapsed.
        elapsed: Duration,
    },

    /// A retry-counter backend failed.
    #[error("retry counter backend '{backend}' failed: {message}")]
    CounterBackend {
        /// Name of the backend.
        backend: String,
        /// Error message describing the failure.
        message: String,
    },

    /// A counter TTL exceeded the permitted maximum.
    #[error("counter ttl {ttl:?} exceeds maximum {max:?}")]
    InvalidTtl {
        /// The requested TTL.
        ttl: Duration,
        /// The maximum permitted TTL.
        max: Duration,
    },

    /// A compensation action failed.
    #[error("compensation '{action}' failed: {message}")]
    Compensation {
        /// Name of the compensation action.
        action: String,
        /// Error message describing the failure.
        message: String,
    },

    /// The retry scheduler has been shut down.
    #[error("retry scheduler has been shut down")]
    SchedulerShutdown,

    /// The unit-of-work source failed.
    #[error("unit source '{source_id}' failed: {message}")]
    Source {
        /// Identifier of the source.
        source_id: String,
        /// Error message describing the failure.
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl ResilienceError {
    /// Returns `true` if the call was refused by a circuit breaker.
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Returns `true` for errors that are recovered internally and are never
    /// the unit of work's own failure.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::CounterBackend { .. } | Self::Compensation { .. } | Self::Source { .. }
        )
    }

    /// Returns the last operation error, if this is a `Failed` error.
    pub fn last_error(&self) -> Option<&OperationError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Creates a `CounterBackend` error.
    pub fn counter_backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CounterBackend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Creates a `Compensation` error.
    pub fn compensation(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compensation {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Creates a `Source` error.
    pub fn source_failed(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// Creates a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// A specialized `Result` type for library operations.
pub type ResilienceResult<T> = Result<T, ResilienceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_kind_checks_one_cause_level() {
        let root = OperationError::timeout("socket read");
        let middle = OperationError::internal("client failed").with_cause(root);
        let top = OperationError::new(ErrorKind::named("wrapper"), "outer").with_cause(middle);

        assert!(top.matches_kind(&ErrorKind::named("wrapper")));
        assert!(top.matches_kind(&ErrorKind::Internal));
        // Two levels down is not inspected
        assert!(!top.matches_kind(&ErrorKind::Timeout));
    }

    #[test]
    fn test_error_kind_names_roundtrip() {
        for kind in [
            ErrorKind::Timeout,
            ErrorKind::RateLimited,
            ErrorKind::NotFound,
            ErrorKind::named("payment_declined"),
        ] {
            assert_eq!(ErrorKind::from_name(kind.name()), kind);
        }
    }

    #[test]
    fn test_network_kinds() {
        assert!(ErrorKind::Connection.is_network());
        assert!(!ErrorKind::InvalidInput.is_network());
    }

    #[test]
    fn test_resilience_error_classification() {
        let denied = ResilienceError::CircuitOpen {
            name: "payments".into(),
            recovery_hint: None,
        };
        assert!(denied.is_denied());
        assert!(!denied.is_internal());

        let backend = ResilienceError::counter_backend("shared", "connection refused");
        assert!(backend.is_internal());
    }

    #[test]
    fn test_failed_display_and_source() {
        let err = ResilienceError::Failed {
            action: "charge".into(),
            attempts: 3,
            error: OperationError::connection("reset by peer"),
        };
        assert!(err.to_string().contains("3 attempt(s)"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.last_error().is_some());
    }
}
