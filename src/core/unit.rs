//! The unit of work processed by a resilient operation.
//!
//! A `UnitOfWork` is the transport collaborator's handle to one message or
//! task: an opaque identifier, the raw payload, the logical action name, and
//! the identifier of the source it was pulled from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of hex characters of the BLAKE3 payload digest kept in retry keys.
const CONTENT_HASH_LEN: usize = 16;

/// A single message or task instance.
///
/// # Examples
///
/// ```rust
/// use breakwater::core::UnitOfWork;
///
/// let unit = UnitOfWork::new("order-42", "charge-card", b"{\"amount\":10}".to_vec())
///     .with_source("orders-stream");
///
/// assert_eq!(unit.retry_key().as_str().split(':').count(), 3);
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOfWork {
    /// Opaque identifier assigned by the source (message id, task id, ...).
    pub id: String,
    /// Logical action name this unit is processed by.
    pub action: String,
    /// Identifier of the source the unit was pulled from, if any.
    pub source: Option<String>,
    /// Raw payload.
    pub payload: Vec<u8>,
}

impl UnitOfWork {
    /// Creates a new unit of work.
    pub fn new(id: impl Into<String>, action: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            source: None,
            payload: payload.into(),
        }
    }

    /// Sets the source identifier.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns the payload as UTF-8 text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Returns the truncated BLAKE3 digest of the payload.
    pub fn content_hash(&self) -> String {
        let mut hex = blake3::hash(&self.payload).to_hex().to_string();
        hex.truncate(CONTENT_HASH_LEN);
        hex
    }

    /// Derives the retry-counter key for this unit.
    pub fn retry_key(&self) -> RetryKey {
        RetryKey::derive(&self.action, &self.id, &self.payload)
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("action", &self.action)
            .field("source", &self.source)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Key under which attempts of one unit of work are counted.
///
/// Formatted as `{action}:{unit_id}:{content_hash}`. Two payloads that share
/// an identifier get different keys; retries of the same payload share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RetryKey(String);

impl RetryKey {
    /// Derives a key from the action name, unit identifier and payload.
    pub fn derive(action: &str, unit_id: &str, payload: &[u8]) -> Self {
        let mut hash = blake3::hash(payload).to_hex().to_string();
        hash.truncate(CONTENT_HASH_LEN);
        Self(format!("{action}:{unit_id}:{hash}"))
    }

    /// Wraps an already-formatted key.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RetryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RetryKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
