//! Core types and traits for the breakwater library.
//!
//! This module provides the fundamental building blocks used throughout
//! the library:
//!
//! - [`error`] - `ErrorKind`, `OperationError` and `ResilienceError`
//! - [`unit`] - The unit of work and its retry-counter key
//! - [`context`] - The per-attempt `FailureContext`
//! - [`traits`] - The `Operation` and `UnitSource` seams

pub mod context;
pub mod error;
pub mod traits;
pub mod unit;

// Re-export commonly used types at the core level
pub use context::FailureContext;
pub use error::{ErrorKind, OperationError, ResilienceError, ResilienceResult};
pub use traits::{ArcOperation, ArcUnitSource, FnOperation, Operation, UnitSource};
pub use unit::{RetryKey, UnitOfWork};
