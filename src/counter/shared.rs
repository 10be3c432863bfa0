//! Retry counter backed by an external atomic-counter service.

use crate::core::ResilienceError;
use crate::counter::traits::{validate_ttl, RetryCounter};

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Contract an external counter store must satisfy.
///
/// Any shared cache or database offering an atomic increment-with-expiry can
/// back a [`SharedRetryCounter`]: counts then stay consistent across every
/// process instance using the same store.
#[async_trait]
pub trait CounterStore: Send + Sync + Debug {
    /// Returns the name of the store, for logging.
    fn name(&self) -> &str;

    /// Atomically increments `key` and returns the new value.
    ///
    /// When `ttl` is set, the entry expires `ttl` after this call.
    async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<i64, ResilienceError>;

    /// Returns the value of `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<i64>, ResilienceError>;

    /// Deletes `key`.
    async fn delete(&self, key: &str) -> Result<(), ResilienceError>;

    /// Returns `true` if `key` is present.
    async fn exists(&self, key: &str) -> Result<bool, ResilienceError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Releases connections held by the store.
    async fn close(&self) -> Result<(), ResilienceError> {
        Ok(())
    }
}

/// Retry counter delegating to a [`CounterStore`].
///
/// Keys are namespaced with `key_prefix` so several applications can share
/// one store. Negative values reported by the store are clamped to 0.
#[derive(Debug, Clone)]
pub struct SharedRetryCounter {
    store: Arc<dyn CounterStore>,
    key_prefix: String,
    default_ttl: Option<Duration>,
}

impl SharedRetryCounter {
    /// Creates a shared counter over `store`.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            key_prefix: "retry:".to_string(),
            default_ttl: Some(Duration::from_secs(60 * 60)),
        }
    }

    /// Sets the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets the TTL applied by `increment`.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Returns the key prefix.
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    fn store_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl RetryCounter for SharedRetryCounter {
    fn backend(&self) -> &str {
        self.store.name()
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Option<Duration>) -> Result<u64, ResilienceError> {
        validate_ttl(ttl)?;
        let value = self.store.increment(&self.store_key(key), ttl).await?;
        Ok(clamp_count(value))
    }

    async fn get(&self, key: &str) -> Result<u64, ResilienceError> {
        let value = self.store.get(&self.store_key(key)).await?;
        Ok(value.map(clamp_count).unwrap_or(0))
    }

    async fn reset(&self, key: &str) -> Result<(), ResilienceError> {
        self.store.delete(&self.store_key(key)).await
    }

    async fn exists(&self, key: &str) -> Result<bool, ResilienceError> {
        self.store.exists(&self.store_key(key)).await
    }

    async fn close(&self) -> Result<(), ResilienceError> {
        self.store.close().await
    }
}

fn clamp_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
