//! In-process retry counter.

use crate::core::ResilienceError;
use crate::counter::traits::{validate_ttl, RetryCounter};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Configuration for a [`LocalRetryCounter`].
#[derive(Debug, Clone)]
pub struct LocalCounterConfig {
    /// TTL applied by `increment`.
    pub default_ttl: Option<Duration>,

    /// How often expired entries are swept.
    pub sweep_interval: Duration,
}

impl Default for LocalCounterConfig {
    fn default() -> Self {
        Self {
            default_ttl: Some(Duration::from_secs(60 * 60)),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl LocalCounterConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default TTL.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(Duration::from_millis(1));
        self
    }
}

#[derive(Debug, Clone)]
struct Entry {
    count: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory retry counter.
///
/// Entries live in a concurrent map with per-key atomic increments. When
/// created inside a Tokio runtime, a background task sweeps expired entries
/// every `sweep_interval`; expired entries are also treated as absent on read.
#[derive(Debug)]
pub struct LocalRetryCounter {
    entries: Arc<DashMap<String, Entry>>,
    config: LocalCounterConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl LocalRetryCounter {
    /// Creates a new local counter.
    pub fn new(config: LocalCounterConfig) -> Self {
        let entries = Arc::new(DashMap::new());
        let sweeper = spawn_sweeper(Arc::downgrade(&entries), config.sweep_interval);

        Self {
            entries,
            config,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Creates a new local counter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(LocalCounterConfig::default())
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &LocalCounterConfig {
        &self.config
    }

    /// Removes expired entries and returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        sweep(&self.entries, Instant::now())
    }

    /// Returns the number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` while the background sweeper is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn stop_sweeper(&self) {
        if let Some(handle) = self
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

impl Default for LocalRetryCounter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Drop for LocalRetryCounter {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

#[async_trait]
impl RetryCounter for LocalRetryCounter {
    fn backend(&self) -> &str {
        "local"
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.config.default_ttl
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Option<Duration>) -> Result<u64, ResilienceError> {
        validate_ttl(ttl)?;
        let now = Instant::now();

        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            count: 0,
            expires_at: None,
        });
        if entry.is_expired(now) {
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);
        entry.expires_at = ttl.map(|ttl| now + ttl);

        Ok(entry.count)
    }

    async fn get(&self, key: &str) -> Result<u64, ResilienceError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.count)
            .unwrap_or(0))
    }

    async fn reset(&self, key: &str) -> Result<(), ResilienceError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ResilienceError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn close(&self) -> Result<(), ResilienceError> {
        self.stop_sweeper();
        Ok(())
    }
}

fn sweep(entries: &DashMap<String, Entry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before.saturating_sub(entries.len())
}

fn spawn_sweeper(entries: Weak<DashMap<String, Entry>>, period: Duration) -> Option<JoinHandle<()>> {
    let runtime = tokio::runtime::Handle::try_current().ok()?;
    let period = period.max(Duration::from_millis(1));

    Some(runtime.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(entries) = entries.upgrade() else {
                break;
            };
            let removed = sweep(&entries, Instant::now());
            if removed > 0 {
                tracing::trace!(removed, "Swept expired retry counters");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::MAX_COUNTER_TTL;

    #[tokio::test]
    async fn test_increment_get_reset() {
        let counter = LocalRetryCounter::with_defaults();
        assert_eq!(counter.get("k").await.unwrap(), 0);
        assert!(!counter.exists("k").await.unwrap());

        for expected in 1..=4 {
            assert_eq!(counter.increment("k").await.unwrap(), expected);
        }
        assert_eq!(counter.get("k").await.unwrap(), 4);
        assert!(counter.exists("k").await.unwrap());

        counter.reset("k").await.unwrap();
        assert_eq!(counter.get("k").await.unwrap(), 0);
        assert!(!counter.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let counter = LocalRetryCounter::with_defaults();
        counter.increment("a").await.unwrap();
        counter.increment("a").await.unwrap();
        counter.increment("b").await.unwrap();

        assert_eq!(counter.get("a").await.unwrap(), 2);
        assert_eq!(counter.get("b").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejects_ttl_over_seven_days() {
        let counter = LocalRetryCounter::with_defaults();
        let result = counter
            .increment_with_ttl("k", Some(MAX_COUNTER_TTL + Duration::from_secs(1)))
            .await;
        assert!(matches!(result, Err(ResilienceError::InvalidTtl { .. })));
        assert!(!counter.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entries_restart_and_sweep() {
        let counter = LocalRetryCounter::with_defaults();
        counter
            .increment_with_ttl("k", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        counter.increment_with_ttl("keep", None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(counter.get("k").await.unwrap(), 0);
        assert!(!counter.exists("k").await.unwrap());
        assert_eq!(counter.sweep_expired(), 1);
        assert_eq!(counter.len(), 1);

        // An expired key counts from zero again
        counter
            .increment_with_ttl("k", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.increment("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_background_sweeper_removes_expired() {
        let config = LocalCounterConfig::new().with_sweep_interval(Duration::from_millis(10));
        let counter = LocalRetryCounter::new(config);
        assert!(counter.is_sweeping());

        counter
            .increment_with_ttl("k", Some(Duration::from_millis(5)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(counter.is_empty());
    }

    #[tokio::test]
    async fn test_close_stops_sweeper() {
        let counter = LocalRetryCounter::with_defaults();
        assert!(counter.is_sweeping());
        counter.close().await.unwrap();
        assert!(!counter.is_sweeping());
    }

    #[test]
    fn test_without_runtime_has_no_sweeper() {
        let counter = LocalRetryCounter::with_defaults();
        assert!(!counter.is_sweeping());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_atomic() {
        let counter = Arc::new(LocalRetryCounter::with_defaults());
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            tasks.push(tokio::spawn(async move {
                for _ in 0..100 {
                    counter.increment("shared").await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(counter.get("shared").await.unwrap(), 800);
    }
}
