//! Structured audit logging for the failure lifecycle.
//!
//! This module provides functions for emitting structured audit events
//! using the `tracing` crate under the `breakwater::audit` target. Events
//! can be captured by any tracing subscriber (JSON file, OpenTelemetry,
//! etc.) and filtered separately from diagnostic logs.

mod events;

pub use events::{
    emit_compensation_failed, emit_counter_fallback, emit_gave_up, emit_retry_scheduled,
    emit_state_transition, emit_unit_abandoned, AuditEvent, LifecycleAuditEvent, LifecycleStage,
    TransitionAuditEvent, AUDIT_TARGET,
};
