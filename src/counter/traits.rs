//! Retry counter trait definition.

use crate::core::ResilienceError;

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Longest TTL a counter entry may carry.
pub const MAX_COUNTER_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Per-key attempt counting.
///
/// Counts start at 0 for an unseen key, never go negative, and every
/// increment is atomic per key. Keys are caller-constructed strings, stable
/// across retries of the same unit of work (see
/// [`RetryKey`](crate::core::RetryKey)).
///
/// # Example Implementation
///
/// ```rust,ignore
/// use breakwater::counter::RetryCounter;
/// use breakwater::core::ResilienceError;
/// use async_trait::async_trait;
/// use std::time::Duration;
///
/// #[derive(Debug)]
/// struct MyCounter {
///     // Your storage implementation
/// }
///
/// #[async_trait]
/// impl RetryCounter for MyCounter {
///     fn backend(&self) -> &str {
///         "mine"
///     }
///
///     async fn increment_with_ttl(
///         &self,
///         key: &str,
///         ttl: Option<Duration>,
///     ) -> Result<u64, ResilienceError> {
///         todo!()
///     }
///
///     async fn get(&self, key: &str) -> Result<u64, ResilienceError> {
///         todo!()
///     }
///
///     async fn reset(&self, key: &str) -> Result<(), ResilienceError> {
///         todo!()
///     }
///
///     async fn exists(&self, key: &str) -> Result<bool, ResilienceError> {
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait RetryCounter: Send + Sync + Debug {
    /// Returns the name of the backend, for logging.
    fn backend(&self) -> &str;

    /// Returns the TTL applied by [`increment`](Self::increment).
    fn default_ttl(&self) -> Option<Duration> {
        None
    }

    /// Increments the count for `key` and returns the new count.
    async fn increment(&self, key: &str) -> Result<u64, ResilienceError> {
        self.increment_with_ttl(key, self.default_ttl()).await
    }

    /// Increments the count for `key`, (re)setting its expiry to `ttl`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTtl` if `ttl` exceeds [`MAX_COUNTER_TTL`].
    async fn increment_with_ttl(&self, key: &str, ttl: Option<Duration>) -> Result<u64, ResilienceError>;

    /// Returns the current count for `key` (0 if unseen or expired).
    async fn get(&self, key: &str) -> Result<u64, ResilienceError>;

    /// Removes the entry for `key`.
    async fn reset(&self, key: &str) -> Result<(), ResilienceError>;

    /// Returns `true` if a live entry exists for `key`.
    async fn exists(&self, key: &str) -> Result<bool, ResilienceError>;

    /// Releases background resources held by the counter.
    async fn close(&self) -> Result<(), ResilienceError> {
        Ok(())
    }
}

/// An arc-wrapped retry counter for shared ownership.
pub type ArcRetryCounter = Arc<dyn RetryCounter>;

/// Rejects TTLs longer than [`MAX_COUNTER_TTL`].
pub fn validate_ttl(ttl: Option<Duration>) -> Result<(), ResilienceError> {
    match ttl {
        Some(ttl) if ttl > MAX_COUNTER_TTL => Err(ResilienceError::InvalidTtl {
            ttl,
            max: MAX_COUNTER_TTL,
        }),
        _ => Ok(()),
    }
}
