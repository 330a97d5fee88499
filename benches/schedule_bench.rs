//! Benchmarks for the controller's hot paths.
//!
//! Benchmarks cover:
//! - Schedule queue scan for due entries
//! - Fleet projection used for renegotiation offers
//! - Message record encode/decode
//! - Request processing through the controller

#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use fleet_dispatch::builders::ControllerBuilder;
use fleet_dispatch::config::ControllerConfig;
use fleet_dispatch::core::fleet::SlotClaim;
use fleet_dispatch::core::{FleetTable, ScheduleEntry, ScheduleQueue};
use fleet_dispatch::infra::{ClientCommand, InMemoryOutbox, Message};

use tokio::runtime::Runtime;

// ============================================================================
// Schedule Queue
// ============================================================================

fn bench_schedule_due_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_due_scan");

    for size in [10_usize, 50, 500] {
        let queue = ScheduleQueue::new(size);
        for id in 0..size as u64 {
            let entry = ScheduleEntry::new(id + 1, "ana", 1, id % 20, 3, "porto");
            let entry = if id % 4 == 0 { entry.with_offer(30, 0) } else { entry };
            queue.insert(entry).unwrap();
        }
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &queue, |b, queue| {
            b.iter(|| black_box(queue.due(black_box(10))));
        });
    }
    group.finish();
}

// ============================================================================
// Fleet Table
// ============================================================================

fn bench_fleet_projection(c: &mut Criterion) {
    let mut group = c.benchmark_group("fleet_projected_free_tick");

    for size in [10_usize, 100] {
        let fleet = FleetTable::new(size);
        for id in 0..size as u64 {
            fleet
                .reserve_free_slot(SlotClaim {
                    service_id: id,
                    owner_pid: 1,
                    username: "ana".into(),
                    destination: "porto".into(),
                    distance: id,
                    estimated_completion: 100 + id,
                })
                .unwrap();
        }
        group.bench_with_input(BenchmarkId::from_parameter(size), &fleet, |b, fleet| {
            b.iter(|| black_box(fleet.projected_free_tick(black_box(5), 10)));
        });
    }
    group.finish();
}

// ============================================================================
// Message Record
// ============================================================================

fn bench_record_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_codec");
    let message = Message::request(4242, ClientCommand::Schedule, "ana", "12 porto 7");
    let record = message.encode();

    group.bench_function("encode", |b| b.iter(|| black_box(black_box(&message).encode())));
    group.bench_function("decode", |b| {
        b.iter(|| black_box(Message::decode(black_box(&record)).unwrap()));
    });
    group.finish();
}

// ============================================================================
// Request Processing
// ============================================================================

fn bench_query_request(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let outbox = Arc::new(InMemoryOutbox::new());
    let controller = ControllerBuilder::new(ControllerConfig::default())
        .with_outbox(outbox.clone())
        .build()
        .unwrap();
    rt.block_on(async {
        controller
            .handle_message(Message::request(1, ClientCommand::Login, "ana", ""))
            .await;
        for hour in 10..30 {
            controller
                .handle_message(Message::request(1, ClientCommand::Schedule, "ana", format!("{hour} porto 3")))
                .await;
        }
    });

    c.bench_function("handle_query_20_pending", |b| {
        b.to_async(&rt).iter(|| async {
            controller
                .handle_message(Message::request(1, ClientCommand::Query, "ana", ""))
                .await;
            black_box(outbox.take(1));
        });
    });
}

criterion_group!(
    benches,
    bench_schedule_due_scan,
    bench_fleet_projection,
    bench_record_codec,
    bench_query_request
);
criterion_main!(benches);
