//! Concurrent access to the fleet table and the request processor.

use std::sync::Arc;

use fleet_dispatch::builders::ControllerBuilder;
use fleet_dispatch::config::ControllerConfig;
use fleet_dispatch::core::fleet::SlotClaim;
use fleet_dispatch::core::FleetTable;
use fleet_dispatch::infra::{ClientCommand, InMemoryOutbox, Message, ReplyKind};
use futures::future::join_all;

fn claim(id: u64) -> SlotClaim {
    SlotClaim {
        service_id: id,
        owner_pid: 1,
        username: "ana".into(),
        destination: "porto".into(),
        distance: 2,
        estimated_completion: 2,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reservations_never_exceed_capacity() {
    let fleet = Arc::new(FleetTable::new(5));

    let attempts = (0..64).map(|id| {
        let fleet = Arc::clone(&fleet);
        tokio::spawn(async move { fleet.reserve_free_slot(claim(id)) })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let mut slots: Vec<usize> = results.into_iter().flatten().collect();
    slots.sort_unstable();
    assert_eq!(slots, vec![0, 1, 2, 3, 4]);
    assert_eq!(fleet.occupied_count(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_logins_with_same_name() {
    let outbox = Arc::new(InMemoryOutbox::new());
    let controller = ControllerBuilder::new(ControllerConfig {
        max_clients: 8,
        ..ControllerConfig::default()
    })
    .with_outbox(outbox.clone())
    .build()
    .unwrap();

    let logins = (1..=8).map(|pid| {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            controller
                .handle_message(Message::request(pid, ClientCommand::Login, "ana", ""))
                .await;
        })
    });
    for joined in join_all(logins).await {
        joined.unwrap();
    }

    let accepted = (1..=8)
        .filter(|pid| !outbox.fetch_kind(*pid, ReplyKind::LoginOk).is_empty())
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(controller.sessions().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_immediate_requests_respect_fleet_size() {
    let outbox = Arc::new(InMemoryOutbox::new());
    let controller = ControllerBuilder::new(ControllerConfig {
        max_vehicles: 3,
        max_clients: 8,
        tick_ms: 60_000,
        ..ControllerConfig::default()
    })
    .with_outbox(outbox.clone())
    .build()
    .unwrap();

    for pid in 1..=8 {
        controller
            .handle_message(Message::request(pid, ClientCommand::Login, format!("user{pid}"), ""))
            .await;
    }

    let requests = (1..=8).map(|pid| {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            controller
                .handle_message(Message::request(pid, ClientCommand::Schedule, format!("user{pid}"), "0 porto 10"))
                .await;
        })
    });
    for joined in join_all(requests).await {
        joined.unwrap();
    }

    assert_eq!(controller.fleet().len(), 3);
    assert_eq!(controller.pending().len(), 5);
    assert!(controller.pending().iter().all(|e| e.awaiting_confirmation));

    controller.shutdown().await;
}
