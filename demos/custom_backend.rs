//! Custom backend example demonstrating how to implement a counter store.
//!
//! This example shows how to:
//! - Implement the CounterStore trait for a custom backend
//! - Share retry counts through a SharedRetryCounter
//! - Route only some actions to it with a HybridRetryCounter
//!
//! Run with: cargo run --example custom_backend

use async_trait::async_trait;
use breakwater::counter::{CounterStore, KeySelector};
use breakwater::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A store with cache semantics: atomic increments and per-key expiry.
///
/// Stands in for a shared cache reachable by every process instance.
#[derive(Debug, Default)]
struct CacheCounterStore {
    entries: Mutex<HashMap<String, (i64, Option<Instant>)>>,
}

impl CacheCounterStore {
    fn new() -> Self {
        Self::default()
    }

    fn live_entry(entries: &mut HashMap<String, (i64, Option<Instant>)>, key: &str) -> Option<i64> {
        let expired = matches!(entries.get(key), Some((_, Some(expires_at))) if *expires_at <= Instant::now());
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|(value, _)| *value)
    }
}

#[async_trait]
impl CounterStore for CacheCounterStore {
    fn name(&self) -> &str {
        "cache"
    }

    async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<i64, ResilienceError> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let value = Self::live_entry(&mut entries, key).unwrap_or(0) + 1;
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);

        tracing::debug!(store = "cache", key, value, "Incremented counter");
        entries.insert(key.to_string(), (value, expires_at));
        Ok(value)
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, ResilienceError> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(Self::live_entry(&mut entries, key))
    }

    async fn delete(&self, key: &str) -> Result<(), ResilienceError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Custom Backend Example ===\n");

    let store = Arc::new(CacheCounterStore::new());
    let shared = Arc::new(SharedRetryCounter::new(store.clone()).with_key_prefix("shop:"));

    // Test 1: count retries through the custom store
    println!("=== Test 1: Shared counting ===");
    let policy = RetryPolicy::new()
        .with_max_attempts(4)
        .with_strategy(BackoffStrategy::Fixed)
        .with_base_delay(Duration::from_millis(50));

    let flaky = Arc::new(MockOperation::new().failing_first(2).with_error_kind(ErrorKind::Timeout));
    let wrapper = ResilientOperation::builder(flaky.clone())
        .with_counter(shared.clone())
        .with_handler(FailureHandler::new(policy))
        .build();

    let unit = UnitOfWork::new("order-7", "payment", b"{\"amount\":42}".to_vec());
    let key = unit.retry_key();
    let completion = wrapper.execute(unit).await?;

    println!("Completed after {} attempt(s)", completion.attempts());
    println!("Invocations: {}", flaky.invocation_count());
    println!("Counter cleared on success: {}", !shared.exists(key.as_str()).await?);

    // Test 2: only payment keys go to the shared store
    println!("\n=== Test 2: Hybrid routing ===");
    let local = Arc::new(LocalRetryCounter::with_defaults());
    let hybrid = Arc::new(HybridRetryCounter::new(
        local.clone(),
        shared.clone(),
        KeySelector::prefix(["payment:"]),
    ));

    let payment_key = UnitOfWork::new("order-8", "payment", b"{}".to_vec()).retry_key();
    let email_key = UnitOfWork::new("order-8", "email", b"{}".to_vec()).retry_key();
    hybrid.increment(payment_key.as_str()).await?;
    hybrid.increment(email_key.as_str()).await?;

    println!("payment key in shared store: {}", shared.exists(payment_key.as_str()).await?);
    println!("email key in shared store: {}", shared.exists(email_key.as_str()).await?);
    println!("email key in local counter: {}", local.exists(email_key.as_str()).await?);

    hybrid.reset(payment_key.as_str()).await?;
    hybrid.reset(email_key.as_str()).await?;

    wrapper.scheduler().shutdown();
    hybrid.close().await?;

    println!("\n=== Example Complete ===");
    Ok(())
}
