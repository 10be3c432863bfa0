//! Orchestration of the failure lifecycle.
//!
//! The [`ResilientOperation`] wraps an operation with counting, retry
//! scheduling and compensation. Retries run on a [`RetryScheduler`]; each
//! background lifecycle is observed through a [`WorkHandle`].
//! [`ResilienceFactory`] builds wrappers from named presets.

mod factory;
mod handle;
mod scheduler;
mod wrapper;

pub use factory::ResilienceFactory;
pub use handle::{Completion, WorkHandle, WorkStatus};
pub use scheduler::RetryScheduler;
pub use wrapper::{AttemptOutcome, ResilientOperation, ResilientOperationBuilder};
