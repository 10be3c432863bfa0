//! In-memory counter store.

use crate::core::ResilienceError;
use crate::counter::CounterStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A [`CounterStore`] kept in process memory.
///
/// Stands in for an external store in tests and single-instance
/// deployments. Availability can be toggled to simulate outages: while
/// unavailable every call fails with `CounterBackend`.
///
/// # Examples
///
/// ```rust
/// use breakwater::backends::InMemoryCounterStore;
///
/// let store = InMemoryCounterStore::new();
/// store.set_available(false); // every call now fails
/// ```
#[derive(Debug)]
pub struct InMemoryCounterStore {
    /// Values and expiry, keyed by store key.
    entries: Mutex<HashMap<String, (i64, Option<Instant>)>>,
    /// Whether calls succeed.
    available: AtomicBool,
    /// Counter for store calls.
    call_count: AtomicU64,
}

impl InMemoryCounterStore {
    /// Creates an empty, available store.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            call_count: AtomicU64::new(0),
        }
    }

    /// Makes every subsequent call succeed or fail.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Sets `key` to `value` without expiry.
    pub fn set(&self, key: impl Into<String>, value: i64) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.into(), (value, None));
    }

    /// Returns the number of calls made against the store.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    fn check_available(&self) -> Result<(), ResilienceError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ResilienceError::counter_backend("in-memory", "store unavailable"))
        }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<i64, ResilienceError> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let entry = entries.entry(key.to_string()).or_insert((0, None));
        if entry.1.is_some_and(|at| now >= at) {
            entry.0 = 0;
        }
        entry.0 = entry.0.saturating_add(1);
        entry.1 = ttl.map(|ttl| now + ttl);
        Ok(entry.0)
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, ResilienceError> {
        self.check_available()?;
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .filter(|(_, expires_at)| !expires_at.is_some_and(|at| now >= at))
            .map(|(value, _)| *value))
    }

    async fn delete(&self, key: &str) -> Result<(), ResilienceError> {
        self.check_available()?;
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_increment_and_expiry() {
        let store = InMemoryCounterStore::new();
        assert_eq!(store.increment("k", Some(Duration::from_millis(10))).await.unwrap(), 1);
        assert_eq!(store.increment("k", Some(Duration::from_millis(10))).await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
        assert_eq!(store.increment("k", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = InMemoryCounterStore::new();
        store.set_available(false);

        assert!(store.increment("k", None).await.is_err());
        assert!(store.get("k").await.is_err());
        assert!(store.delete("k").await.is_err());
        assert_eq!(store.call_count(), 3);

        store.set_available(true);
        assert!(store.increment("k", None).await.is_ok());
    }
}
