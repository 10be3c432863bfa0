//! Retry counter routing each key to a local or shared backend.

use crate::audit;
use crate::core::ResilienceError;
use crate::counter::traits::{ArcRetryCounter, RetryCounter};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type KeyPredicate = dyn Fn(&str) -> bool + Send + Sync;

/// Decides, per key, whether the shared backend is used.
#[derive(Clone)]
pub struct KeySelector {
    predicate: Arc<KeyPredicate>,
    description: String,
}

impl KeySelector {
    /// Routes every key to the local backend.
    pub fn all_local() -> Self {
        Self::custom("all local", |_| false)
    }

    /// Routes every key to the shared backend.
    pub fn all_shared() -> Self {
        Self::custom("all shared", |_| true)
    }

    /// Routes keys starting with any of `prefixes` to the shared backend.
    pub fn prefix<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes: Vec<String> = prefixes.into_iter().map(Into::into).collect();
        let description = format!("prefix {prefixes:?}");
        Self::custom(description, move |key| {
            prefixes.iter().any(|prefix| key.starts_with(prefix.as_str()))
        })
    }

    /// Routes keys for which `predicate` holds to the shared backend.
    pub fn custom<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            description: description.into(),
        }
    }

    /// Returns `true` if `key` goes to the shared backend.
    pub fn use_shared(&self, key: &str) -> bool {
        (self.predicate)(key)
    }
}

impl fmt::Debug for KeySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeySelector").field(&self.description).finish()
    }
}

/// Retry counter combining a local and a shared backend.
///
/// The [`KeySelector`] picks the backend per key. When the shared backend is
/// picked and fails, the operation is served by the local backend instead if
/// `fallback_to_local` is enabled; the failure is logged and never reaches
/// the caller. `reset` always clears both backends and `exists` holds if
/// either backend has the key.
///
/// No lock is held while the shared backend is called.
#[derive(Debug, Clone)]
pub struct HybridRetryCounter {
    local: ArcRetryCounter,
    shared: ArcRetryCounter,
    selector: KeySelector,
    fallback_to_local: bool,
}

impl HybridRetryCounter {
    /// Creates a hybrid counter with fallback enabled.
    pub fn new(local: ArcRetryCounter, shared: ArcRetryCounter, selector: KeySelector) -> Self {
        Self {
            local,
            shared,
            selector,
            fallback_to_local: true,
        }
    }

    /// Enables or disables falling back to the local backend.
    pub fn with_fallback_to_local(mut self, enabled: bool) -> Self {
        self.fallback_to_local = enabled;
        self
    }

    /// Returns whether fallback to the local backend is enabled.
    pub fn falls_back_to_local(&self) -> bool {
        self.fallback_to_local
    }

    /// Returns the local backend.
    pub fn local(&self) -> &ArcRetryCounter {
        &self.local
    }

    /// Returns the shared backend.
    pub fn shared(&self) -> &ArcRetryCounter {
        &self.shared
    }

    /// Decides whether a shared-backend failure is recovered locally.
    fn recover(&self, key: &str, operation: &str, error: ResilienceError) -> Result<(), ResilienceError> {
        if self.fallback_to_local {
            audit::emit_counter_fallback(key, operation, self.shared.backend(), &error);
            Ok(())
        } else {
            Err(error)
        }
    }
}

#[async_trait]
impl RetryCounter for HybridRetryCounter {
    fn backend(&self) -> &str {
        "hybrid"
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.local.default_ttl()
    }

    async fn increment(&self, key: &str) -> Result<u64, ResilienceError> {
        if self.selector.use_shared(key) {
            match self.shared.increment(key).await {
                Ok(count) => return Ok(count),
                Err(e @ ResilienceError::InvalidTtl { .. }) => return Err(e),
                Err(e) => self.recover(key, "increment", e)?,
            }
        }
        self.local.increment(key).await
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Option<Duration>) -> Result<u64, ResilienceError> {
        if self.selector.use_shared(key) {
            match self.shared.increment_with_ttl(key, ttl).await {
                Ok(count) => return Ok(count),
                Err(e @ ResilienceError::InvalidTtl { .. }) => return Err(e),
                Err(e) => self.recover(key, "increment", e)?,
            }
        }
        self.local.increment_with_ttl(key, ttl).await
    }

    async fn get(&self, key: &str) -> Result<u64, ResilienceError> {
        if self.selector.use_shared(key) {
            match self.shared.get(key).await {
                Ok(count) => return Ok(count),
                Err(e) => self.recover(key, "get", e)?,
            }
        }
        self.local.get(key).await
    }

    async fn reset(&self, key: &str) -> Result<(), ResilienceError> {
        let local = self.local.reset(key).await;
        if let Err(e) = self.shared.reset(key).await {
            self.recover(key, "reset", e)?;
        }
        local
    }

    async fn exists(&self, key: &str) -> Result<bool, ResilienceError> {
        if self.local.exists(key).await? {
            return Ok(true);
        }
        match self.shared.exists(key).await {
            Ok(found) => Ok(found),
            Err(e) => {
                self.recover(key, "exists", e)?;
                Ok(false)
            }
        }
    }

    async fn close(&self) -> Result<(), ResilienceError> {
        let local = self.local.close().await;
        let shared = self.shared.close().await;
        local.and(shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryCounterStore;
    use crate::counter::{LocalRetryCounter, SharedRetryCounter};

    fn hybrid(selector: KeySelector) -> (HybridRetryCounter, Arc<InMemoryCounterStore>) {
        let store = Arc::new(InMemoryCounterStore::new());
        let local: ArcRetryCounter = Arc::new(LocalRetryCounter::with_defaults());
        let shared: ArcRetryCounter = Arc::new(SharedRetryCounter::new(store.clone()));
        (HybridRetryCounter::new(local, shared, selector), store)
    }

    #[tokio::test]
    async fn test_routes_by_selector() {
        let (counter, _store) = hybrid(KeySelector::prefix(["payments:"]));

        counter.increment("payments:1").await.unwrap();
        counter.increment("emails:1").await.unwrap();

        assert_eq!(counter.shared().get("payments:1").await.unwrap(), 1);
        assert_eq!(counter.local().get("payments:1").await.unwrap(), 0);
        assert_eq!(counter.local().get("emails:1").await.unwrap(), 1);
        assert_eq!(counter.shared().get("emails:1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_local_when_shared_fails() {
        let (counter, store) = hybrid(KeySelector::all_shared());

        counter.increment("k").await.unwrap();
        store.set_available(false);

        // The shared count is unreachable; local takes over from zero
        assert_eq!(counter.increment("k").await.unwrap(), 1);
        assert_eq!(counter.increment("k").await.unwrap(), 2);
        assert_eq!(counter.get("k").await.unwrap(), 2);
        assert!(counter.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_degrades_to_local_value() {
        let (counter, store) = hybrid(KeySelector::all_shared());
        counter.local().increment("k").await.unwrap();
        counter.local().increment("k").await.unwrap();
        counter.local().increment("k").await.unwrap();

        store.set_available(false);
        assert_eq!(counter.get("k").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_no_fallback_propagates_error() {
        let (counter, store) = hybrid(KeySelector::all_shared());
        let counter = counter.with_fallback_to_local(false);
        store.set_available(false);

        let result = counter.increment("k").await;
        assert!(matches!(result, Err(ResilienceError::CounterBackend { .. })));
        assert_eq!(counter.local().get("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_clears_both_backends() {
        let (counter, _store) = hybrid(KeySelector::all_local());
        counter.local().increment("k").await.unwrap();
        counter.shared().increment("k").await.unwrap();

        counter.reset("k").await.unwrap();

        assert!(!counter.local().exists("k").await.unwrap());
        assert!(!counter.shared().exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_if_either_backend_has_key() {
        let (counter, _store) = hybrid(KeySelector::all_local());
        assert!(!counter.exists("k").await.unwrap());

        counter.shared().increment("k").await.unwrap();
        assert!(counter.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_survives_shared_outage() {
        let (counter, store) = hybrid(KeySelector::all_shared());
        counter.local().increment("k").await.unwrap();
        store.set_available(false);

        counter.reset("k").await.unwrap();
        assert!(!counter.local().exists("k").await.unwrap());
    }
}
