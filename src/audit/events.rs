//! Audit event types and emission functions.

use crate::circuit_breaker::CircuitState;
use crate::core::{FailureContext, ResilienceError, UnitOfWork};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Target every audit event is emitted under.
pub const AUDIT_TARGET: &str = "breakwater::audit";

/// Base trait for audit events.
pub trait AuditEvent: Serialize {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Returns the timestamp of the event.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Audit event for a circuit breaker state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Name of the breaker.
    pub breaker: String,

    /// State before the transition.
    pub from: CircuitState,

    /// State after the transition.
    pub to: CircuitState,
}

impl TransitionAuditEvent {
    /// Creates an event stamped with the current time.
    pub fn new(breaker: impl Into<String>, from: CircuitState, to: CircuitState) -> Self {
        Self {
            timestamp: Utc::now(),
            breaker: breaker.into(),
            from,
            to,
        }
    }
}

impl AuditEvent for TransitionAuditEvent {
    fn event_type(&self) -> &'static str {
        "circuit_state_transition"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Step of a unit's failure lifecycle an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    /// A retry was scheduled.
    RetryScheduled,
    /// Retries are over and the unit is being compensated.
    GaveUp,
    /// A compensation action failed.
    CompensationFailed,
    /// A scheduled retry was dropped.
    UnitAbandoned,
}

impl LifecycleStage {
    /// Returns the event type name of the stage.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RetryScheduled => "retry_scheduled",
            Self::GaveUp => "gave_up",
            Self::CompensationFailed => "compensation_failed",
            Self::UnitAbandoned => "unit_abandoned",
        }
    }
}

/// Audit event for a step in a unit's failure lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleAuditEvent {
    /// Lifecycle stage.
    pub stage: LifecycleStage,

    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Unit id.
    pub unit_id: String,

    /// Action the unit is processed by.
    pub action: String,

    /// Source the unit came from.
    pub source: Option<String>,

    /// Attempt number the event refers to.
    pub attempt: u32,

    /// Kind of the error that triggered the event, if any.
    pub error_kind: Option<String>,

    /// Error message, if any.
    pub error: Option<String>,
}

impl LifecycleAuditEvent {
    fn from_context(stage: LifecycleStage, ctx: &FailureContext) -> Self {
        Self {
            stage,
            timestamp: Utc::now(),
            unit_id: ctx.unit_id().to_string(),
            action: ctx.action().to_string(),
            source: ctx.source().map(str::to_string),
            attempt: ctx.attempt,
            error_kind: Some(ctx.error.kind().to_string()),
            error: Some(ctx.error.message().to_string()),
        }
    }

    fn from_unit(stage: LifecycleStage, unit: &UnitOfWork, attempt: u32) -> Self {
        Self {
            stage,
            timestamp: Utc::now(),
            unit_id: unit.id.clone(),
            action: unit.action.clone(),
            source: unit.source.clone(),
            attempt,
            error_kind: None,
            error: None,
        }
    }
}

impl AuditEvent for LifecycleAuditEvent {
    fn event_type(&self) -> &'static str {
        self.stage.name()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Emits an audit event for a circuit breaker state change.
pub fn emit_state_transition(breaker: &str, from: CircuitState, to: CircuitState) {
    let event = TransitionAuditEvent::new(breaker, from, to);

    if to.is_open() {
        tracing::warn!(
            target: AUDIT_TARGET,
            event_type = event.event_type(),
            breaker = %event.breaker,
            from = %event.from,
            to = %event.to,
            "Circuit breaker opened"
        );
    } else {
        tracing::info!(
            target: AUDIT_TARGET,
            event_type = event.event_type(),
            breaker = %event.breaker,
            from = %event.from,
            to = %event.to,
            "Circuit breaker state changed"
        );
    }
}

/// Emits an audit event for a shared counter failure served locally.
pub fn emit_counter_fallback(key: &str, operation: &str, backend: &str, error: &ResilienceError) {
    tracing::warn!(
        target: AUDIT_TARGET,
        event_type = "counter_fallback",
        key = %key,
        operation = %operation,
        backend = %backend,
        error = %error,
        "Shared retry counter failed, using local counter"
    );
}

/// Emits an audit event for a retry being scheduled.
pub fn emit_retry_scheduled(ctx: &FailureContext, delay: Duration) {
    let event = LifecycleAuditEvent::from_context(LifecycleStage::RetryScheduled, ctx);

    tracing::info!(
        target: AUDIT_TARGET,
        event_type = event.event_type(),
        unit_id = %event.unit_id,
        action = %event.action,
        source = ?event.source,
        attempt = event.attempt,
        max_attempts = ctx.max_attempts,
        delay_ms = delay.as_millis() as u64,
        error_kind = ?event.error_kind,
        error = ?event.error,
        "Retry scheduled"
    );
}

/// Emits an audit event for a unit whose retries are over.
pub fn emit_gave_up(ctx: &FailureContext, compensation: Option<&str>) {
    let event = LifecycleAuditEvent::from_context(LifecycleStage::GaveUp, ctx);

    tracing::warn!(
        target: AUDIT_TARGET,
        event_type = event.event_type(),
        unit_id = %event.unit_id,
        action = %event.action,
        source = ?event.source,
        attempt = event.attempt,
        max_attempts = ctx.max_attempts,
        compensation = ?compensation,
        error_kind = ?event.error_kind,
        error = ?event.error,
        "Giving up on unit"
    );
}

/// Emits an audit event for a failed compensation action.
pub fn emit_compensation_failed(ctx: &FailureContext, action: &str, error: &ResilienceError) {
    let event = LifecycleAuditEvent::from_context(LifecycleStage::CompensationFailed, ctx);

    tracing::error!(
        target: AUDIT_TARGET,
        event_type = event.event_type(),
        unit_id = %event.unit_id,
        action = %event.action,
        source = ?event.source,
        attempt = event.attempt,
        compensation = %action,
        error = %error,
        "Compensation action failed"
    );
}

/// Emits an audit event for a unit whose scheduled retry was dropped.
pub fn emit_unit_abandoned(unit: &UnitOfWork, attempt: u32, reason: &str) {
    let event = LifecycleAuditEvent::from_unit(LifecycleStage::UnitAbandoned, unit, attempt);

    tracing::info!(
        target: AUDIT_TARGET,
        event_type = event.event_type(),
        unit_id = %event.unit_id,
        action = %event.action,
        source = ?event.source,
        attempt = event.attempt,
        reason = %reason,
        "Unit abandoned"
    );
}
