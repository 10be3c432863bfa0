//! Failure handling: the retry-or-give-up decision and compensation.
//!
//! A [`FailureHandler`] turns each failed attempt into a
//! [`FailureHandlingResult`]. When it gives up, the configured
//! [`CompensationAction`] runs once for the unit of work.

mod compensation;
mod failure;

pub use compensation::{
    ArcCompensation, CompensationAction, CompensationResult, CompositeCompensation,
    FnCompensation, LogCompensation, RemoveUnitCompensation,
};
pub use failure::{FailureHandler, FailureHandlingResult};
