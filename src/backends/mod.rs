//! Test and single-instance backend implementations.
//!
//! This module contains implementations of the crate's seams that need no
//! external infrastructure.
//!
//! ## Available Backends
//!
//! - [`memory`] - An in-process [`CounterStore`](crate::counter::CounterStore)
//! - [`mock`] - A mock [`Operation`](crate::core::Operation) and
//!   [`UnitSource`](crate::core::UnitSource) for tests
//!
//! ## Implementing a Custom Counter Store
//!
//! To share retry counts across instances, implement `CounterStore` over
//! a cache with atomic increments:
//!
//! ```rust,ignore
//! use breakwater::core::ResilienceError;
//! use breakwater::counter::CounterStore;
//! use async_trait::async_trait;
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! pub struct MyStore {
//!     // Your connection pool
//! }
//!
//! #[async_trait]
//! impl CounterStore for MyStore {
//!     fn name(&self) -> &str {
//!         "my-store"
//!     }
//!
//!     async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<i64, ResilienceError> {
//!         // INCR followed by EXPIRE, atomically
//!         todo!()
//!     }
//!
//!     async fn get(&self, key: &str) -> Result<Option<i64>, ResilienceError> {
//!         todo!()
//!     }
//!
//!     async fn delete(&self, key: &str) -> Result<(), ResilienceError> {
//!         todo!()
//!     }
//! }
//! ```

pub mod memory;
pub mod mock;

// Re-exports
pub use memory::InMemoryCounterStore;
pub use mock::{MockOperation, MockUnitSource};
