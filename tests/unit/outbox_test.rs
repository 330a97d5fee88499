//! Tests for outbox backends

use fleet_dispatch::core::DispatchError;
use fleet_dispatch::infra::{InMemoryOutbox, Message, Outbox, ReplyKind};

#[tokio::test]
async fn test_in_memory_outbox_delivery() {
    let outbox = InMemoryOutbox::new();
    outbox
        .deliver(10, Message::reply(ReplyKind::LoginOk, "Welcome, ana."))
        .await
        .unwrap();
    outbox
        .deliver(10, Message::reply(ReplyKind::Info, "hello"))
        .await
        .unwrap();

    assert_eq!(outbox.fetch(10).len(), 2);
    assert_eq!(outbox.fetch_kind(10, ReplyKind::LoginOk).len(), 1);
    assert!(outbox.fetch(20).is_empty());

    assert_eq!(outbox.take(10).len(), 2);
    assert!(outbox.fetch(10).is_empty());
}

#[tokio::test]
async fn test_in_memory_outbox_disconnected_client() {
    let outbox = InMemoryOutbox::new();
    outbox.disconnect(10);
    let err = outbox
        .deliver(10, Message::reply(ReplyKind::Info, "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::ResourceUnavailable(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn test_fifo_outbox_without_reader_is_unavailable() {
    use fleet_dispatch::infra::FifoOutbox;

    let dir = std::env::temp_dir();
    let outbox = FifoOutbox::new(dir.clone(), format!("fleet-test-missing-{}-", std::process::id()));
    assert_eq!(
        outbox.path_for(42),
        dir.join(format!("fleet-test-missing-{}-42", std::process::id()))
    );
    let err = outbox
        .deliver(42, Message::reply(ReplyKind::Info, "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::ResourceUnavailable(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn test_fifo_outbox_gives_up_on_client_that_stops_reading() {
    use std::time::Duration;

    use fleet_dispatch::infra::FifoOutbox;
    use nix::sys::stat::Mode;
    use tokio::net::unix::pipe;

    let prefix = format!("fleet-test-stalled-{}-", std::process::id());
    let outbox = FifoOutbox::new(std::env::temp_dir(), prefix)
        .with_delivery_timeout(Duration::from_millis(50));
    let path = outbox.path_for(77);
    let _ = std::fs::remove_file(&path);
    nix::unistd::mkfifo(&path, Mode::from_bits_truncate(0o600)).unwrap();

    // Held open for the whole test and never read.
    let _receiver = pipe::OpenOptions::new().open_receiver(&path).unwrap();

    let mut delivered = 0;
    let mut refused = None;
    for _ in 0..2_000 {
        let attempt = tokio::time::timeout(
            Duration::from_secs(2),
            outbox.deliver(77, Message::reply(ReplyKind::Info, "tick")),
        )
        .await
        .expect("delivery must not block on a full pipe");
        match attempt {
            Ok(()) => delivered += 1,
            Err(e) => {
                refused = Some(e);
                break;
            }
        }
    }

    let _ = std::fs::remove_file(&path);
    assert!(delivered > 0);
    assert!(matches!(refused, Some(DispatchError::ResourceUnavailable(_))));
}
