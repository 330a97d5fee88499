//! Tests for error types

use fleet_dispatch::core::DispatchError;
use fleet_dispatch::infra::{Message, ReplyKind};

#[test]
fn test_duplicate_identity_error() {
    let err = DispatchError::DuplicateIdentity("ana".to_string());
    assert_eq!(format!("{}", err), "user 'ana' already exists");
}

#[test]
fn test_capacity_exceeded_error() {
    let err = DispatchError::CapacityExceeded("fleet full".to_string());
    assert_eq!(format!("{}", err), "capacity exceeded: fleet full");
}

#[test]
fn test_not_found_error() {
    let err = DispatchError::NotFound("service 7".to_string());
    assert_eq!(format!("{}", err), "not found: service 7");
}

#[test]
fn test_precondition_failed_is_bare() {
    let err = DispatchError::PreconditionFailed("not logged in".to_string());
    assert_eq!(format!("{}", err), "not logged in");
}

#[test]
fn test_error_becomes_erro_reply() {
    let err = DispatchError::SyntaxError("expected: cancelar <id|0>".to_string());
    let reply = Message::error(&err);
    assert!(reply.is(ReplyKind::Error));
    assert_eq!(reply.payload, "syntax error: expected: cancelar <id|0>");
}

#[test]
fn test_transient_capacity_classification() {
    assert!(DispatchError::SpawnFailure("x".into()).is_transient_capacity());
    assert!(!DispatchError::ResourceUnavailable("x".into()).is_transient_capacity());
    assert!(!DispatchError::DuplicateIdentity("x".into()).is_transient_capacity());
}
