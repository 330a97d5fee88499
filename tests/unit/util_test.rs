//! Tests for utility functions

use fleet_dispatch::util::{init_tracing, now_ms, ClientPid, ServiceId, DEFAULT_LOG_FILTER};

#[test]
fn test_now_ms_advances() {
    let a = now_ms();
    let b = now_ms();
    assert!(a > 0);
    assert!(b >= a);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    assert_eq!(DEFAULT_LOG_FILTER, "info");
}

#[test]
fn test_id_aliases() {
    let pid: ClientPid = -1;
    let id: ServiceId = 12345;
    assert_eq!(pid, -1);
    assert_eq!(id, 12345);
}
