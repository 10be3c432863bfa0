//! Attempt counting per unit of work.
//!
//! Three backends implement [`RetryCounter`]:
//!
//! - [`LocalRetryCounter`] - in-process map with TTL sweeping
//! - [`SharedRetryCounter`] - delegates to an external [`CounterStore`] so
//!   counts are consistent across process instances
//! - [`HybridRetryCounter`] - routes each key to one of the two, falling
//!   back to local when the shared backend fails

mod hybrid;
mod local;
mod shared;
mod traits;

pub use hybrid::{HybridRetryCounter, KeySelector};
pub use local::{LocalCounterConfig, LocalRetryCounter};
pub use shared::{CounterStore, SharedRetryCounter};
pub use traits::{validate_ttl, ArcRetryCounter, RetryCounter, MAX_COUNTER_TTL};
