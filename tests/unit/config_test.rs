//! Tests for configuration validation

use fleet_dispatch::config::{ChannelConfig, ControllerConfig, RenegotiationConfig};

#[test]
fn test_controller_config_validation() {
    assert!(ControllerConfig::default().validate().is_ok());
}

#[test]
fn test_controller_config_invalid_capacities() {
    for cfg in [
        ControllerConfig {
            max_vehicles: 0,
            ..ControllerConfig::default()
        },
        ControllerConfig {
            max_clients: 0,
            ..ControllerConfig::default()
        },
        ControllerConfig {
            max_schedule: 0,
            ..ControllerConfig::default()
        },
    ] {
        assert!(cfg.validate().is_err());
    }
}

#[test]
fn test_controller_config_invalid_tick() {
    let invalid = ControllerConfig {
        tick_ms: 0,
        ..ControllerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_controller_config_invalid_progress_step() {
    for step in [0, 101] {
        let invalid = ControllerConfig {
            progress_step_percent: step,
            ..ControllerConfig::default()
        };
        assert!(invalid.validate().is_err());
    }
}

#[test]
fn test_controller_config_from_json() {
    let json = r#"{
        "max_vehicles": 3,
        "max_clients": 4,
        "tick_ms": 250,
        "renegotiation": { "notice_interval_ticks": 2, "min_offer_lead_ticks": 1 },
        "channel": { "dir": "/tmp/fleet" }
    }"#;

    let cfg = ControllerConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.max_vehicles, 3);
    assert_eq!(cfg.max_clients, 4);
    assert_eq!(cfg.max_schedule, 50);
    assert_eq!(cfg.tick_ms, 250);
    assert_eq!(
        cfg.renegotiation,
        RenegotiationConfig {
            notice_interval_ticks: 2,
            min_offer_lead_ticks: 1,
            ..RenegotiationConfig::default()
        }
    );
    assert_eq!(cfg.channel.controller_pipe, ChannelConfig::default().controller_pipe);
    assert_eq!(
        cfg.channel.controller_pipe_path(),
        std::path::PathBuf::from("/tmp/fleet/controlador_fifo")
    );
}

#[test]
fn test_controller_config_rejects_invalid_json() {
    assert!(ControllerConfig::from_json_str("{ not json").is_err());
    assert!(ControllerConfig::from_json_str(r#"{ "tick_ms": 0 }"#).is_err());
}
