//! Lifecycle audit trail.
//!
//! Records dispatch, reap, cancellation and renegotiation transitions next to
//! the tracing output, so embedding code and tests can inspect them.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::util::clock::now_ms;
use crate::util::types::{ServiceId, Tick};

/// Lifecycle action recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// Service admitted into a fleet slot.
    Dispatch,
    /// Finished slot returned to the free pool.
    Reap,
    /// Pending entry deactivated or running service signalled.
    Cancel,
    /// Renegotiation offer sent.
    Offer,
    /// Owner answered an offer.
    Decision,
    /// Entry dropped after exhausting its offers.
    Drop,
}

impl AuditAction {
    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Reap => "reap",
            Self::Cancel => "cancel",
            Self::Offer => "offer",
            Self::Decision => "decision",
            Self::Drop => "drop",
        }
    }
}

/// Audit event structure.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Related service.
    pub service_id: ServiceId,
    /// Owning client's name.
    pub username: String,
    /// Action taken.
    pub action: AuditAction,
    /// Simulated time of the transition.
    pub tick: Tick,
    /// Wall-clock timestamp in milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: AuditEvent);
}

/// Bounded in-memory audit sink; the oldest event is evicted first.
pub struct InMemoryAuditSink {
    events: Mutex<VecDeque<AuditEvent>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Stored events for one service, oldest first.
    #[must_use]
    pub fn events_for(&self, service_id: ServiceId) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.service_id == service_id)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Helper to build an audit event with a fresh id and timestamp.
pub fn build_audit_event(
    service_id: ServiceId,
    username: impl Into<String>,
    action: AuditAction,
    tick: Tick,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        service_id,
        username: username.into(),
        action,
        tick,
        created_at_ms: now_ms(),
        detail,
    }
}
