//! Tests for the audit trail

use fleet_dispatch::core::{build_audit_event, AuditAction, AuditSink, InMemoryAuditSink};

#[test]
fn test_audit_event_fields() {
    let event = build_audit_event(7, "ana", AuditAction::Offer, 12, Some("t=17".into()));
    assert_eq!(event.service_id, 7);
    assert_eq!(event.username, "ana");
    assert_eq!(event.action, AuditAction::Offer);
    assert_eq!(event.tick, 12);
    assert_eq!(event.detail.as_deref(), Some("t=17"));
    assert_eq!(event.event_id.len(), 36);
    assert!(event.created_at_ms > 0);
}

#[test]
fn test_event_ids_are_unique() {
    let a = build_audit_event(1, "ana", AuditAction::Dispatch, 0, None);
    let b = build_audit_event(1, "ana", AuditAction::Dispatch, 0, None);
    assert_ne!(a.event_id, b.event_id);
}

#[test]
fn test_in_memory_sink_evicts_oldest() {
    let sink = InMemoryAuditSink::new(2);
    sink.record(build_audit_event(1, "ana", AuditAction::Dispatch, 0, None));
    sink.record(build_audit_event(2, "rui", AuditAction::Dispatch, 1, None));
    sink.record(build_audit_event(1, "ana", AuditAction::Reap, 3, None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].service_id, 2);
    assert_eq!(sink.events_for(1).len(), 1);
    assert_eq!(sink.events_for(1)[0].action, AuditAction::Reap);
}

#[test]
fn test_action_names() {
    assert_eq!(AuditAction::Dispatch.as_str(), "dispatch");
    assert_eq!(AuditAction::Drop.as_str(), "drop");
}
