//! Retry policies and backoff calculation.
//!
//! A [`RetryPolicy`] answers two questions about a failed attempt: may it be
//! retried at all ([`RetryCondition`]), and how long to wait first
//! ([`BackoffStrategy`]).

mod backoff;
mod condition;
mod policy;

pub use backoff::BackoffStrategy;
pub use condition::RetryCondition;
pub use policy::{retry_async, RetryPolicy};
