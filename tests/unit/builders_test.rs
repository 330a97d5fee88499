//! Tests for builder modules

use std::sync::Arc;

use fleet_dispatch::builders::ControllerBuilder;
use fleet_dispatch::config::ControllerConfig;
use fleet_dispatch::core::{DispatchError, InMemoryAuditSink};
use fleet_dispatch::infra::InMemoryOutbox;

#[test]
fn test_controller_builder_defaults() {
    let controller = ControllerBuilder::new(ControllerConfig::default()).build().unwrap();
    assert_eq!(controller.config().max_vehicles, 10);
    assert_eq!(controller.state().fleet.capacity(), 10);
    assert_eq!(controller.state().sessions.capacity(), 2);
    assert_eq!(controller.now(), 0);
    assert_eq!(controller.total_km(), 0);
}

#[test]
fn test_controller_builder_with_backends() {
    let config = ControllerConfig {
        max_vehicles: 1,
        ..ControllerConfig::default()
    };
    let controller = ControllerBuilder::new(config)
        .with_outbox(Arc::new(InMemoryOutbox::new()))
        .with_audit(Arc::new(InMemoryAuditSink::new(8)))
        .build()
        .unwrap();
    assert_eq!(controller.state().fleet.capacity(), 1);
}

#[test]
fn test_controller_builder_rejects_invalid_config() {
    let config = ControllerConfig {
        tick_ms: 0,
        ..ControllerConfig::default()
    };
    let err = ControllerBuilder::new(config).build().err().unwrap();
    assert!(matches!(err, DispatchError::PreconditionFailed(_)));
}
