//! Tests for admin console parsing and rendering

use fleet_dispatch::core::{ClientSession, DispatchError, ScheduleEntry, SlotSnapshot, SlotState};
use fleet_dispatch::runtime::admin::{
    render_fleet, render_km, render_schedule, render_sessions, render_time, AdminCommand,
};

#[test]
fn test_parse_admin_commands() {
    assert_eq!(AdminCommand::parse("listar").unwrap(), Some(AdminCommand::ListSchedule));
    assert_eq!(AdminCommand::parse(" utiliz ").unwrap(), Some(AdminCommand::ListSessions));
    assert_eq!(AdminCommand::parse("frota").unwrap(), Some(AdminCommand::ListFleet));
    assert_eq!(AdminCommand::parse("km").unwrap(), Some(AdminCommand::TotalKm));
    assert_eq!(AdminCommand::parse("hora").unwrap(), Some(AdminCommand::Time));
    assert_eq!(AdminCommand::parse("cancelar 0").unwrap(), Some(AdminCommand::Cancel(0)));
    assert_eq!(AdminCommand::parse("cancelar 12").unwrap(), Some(AdminCommand::Cancel(12)));
    assert_eq!(AdminCommand::parse("terminar").unwrap(), Some(AdminCommand::Shutdown));
    assert_eq!(AdminCommand::parse("   ").unwrap(), None);
}

#[test]
fn test_parse_admin_errors() {
    let err = AdminCommand::parse("voar").unwrap_err();
    assert_eq!(err, DispatchError::SyntaxError("unknown admin command 'voar'".into()));
    assert!(AdminCommand::parse("cancelar").is_err());
    assert!(AdminCommand::parse("cancelar x").is_err());
}

#[test]
fn test_render_schedule() {
    assert_eq!(render_schedule(&[]), "(empty)");

    let plain = ScheduleEntry::new(3, "ana", 10, 8, 4, "braga");
    let offered = ScheduleEntry::new(4, "rui", 20, 2, 6, "porto").with_offer(9, 2);
    assert_eq!(
        render_schedule(&[plain, offered]),
        "ID 3 | client ana | t=8 | dest braga | 4 km\n\
         ID 4 | client rui | t=2 | dest porto | 6 km | awaiting offer t=9"
    );
}

#[test]
fn test_render_sessions() {
    let sessions = vec![ClientSession {
        pid: 10,
        username: "ana".into(),
    }];
    assert_eq!(render_sessions(&sessions), "- ana (PID 10)");
    assert_eq!(render_sessions(&[]), "(empty)");
}

#[test]
fn test_render_fleet() {
    let slot = SlotSnapshot {
        index: 0,
        state: SlotState::Running,
        vehicle_id: Some(5),
        service_id: 3,
        owner_pid: 10,
        username: "ana".into(),
        destination: "braga".into(),
        distance: 4,
        estimated_completion: 12,
        status: "Progresso: 50% (2/4 km)".into(),
    };
    assert_eq!(
        render_fleet(&[slot.clone()], 1),
        "slot 0 | vehicle 5 | client 10 | service 3 | Progresso: 50% (2/4 km)"
    );
    assert_eq!(render_fleet(&[], 0), "(empty)");
}

#[test]
fn test_render_fleet_lists_free_slots() {
    let slot = SlotSnapshot {
        index: 1,
        state: SlotState::Reserved,
        vehicle_id: None,
        service_id: 7,
        owner_pid: 20,
        username: "rui".into(),
        destination: "faro".into(),
        distance: 2,
        estimated_completion: 9,
        status: "starting".into(),
    };
    assert_eq!(
        render_fleet(&[slot], 3),
        "slot 0 | free\nslot 1 | vehicle - | client 20 | service 7 | starting\nslot 2 | free"
    );
    assert_eq!(render_fleet(&[], 2), "slot 0 | free\nslot 1 | free");
}

#[test]
fn test_render_scalars() {
    assert_eq!(render_km(42), "Total distance: 42 km");
    assert_eq!(render_time(7), "Current time: t=7");
}
