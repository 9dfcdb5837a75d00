//! # Connection Registry Benchmarks
//!
//! | Operation | Target |
//! |-----------|--------|
//! | register + unregister | < 5µs |
//! | broadcast to a room of 100 | < 50µs |
//! | broadcast to an absent identity | < 1µs |

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kiosk_gateway::ws::{ConnectionHandle, ConnectionRegistry};
use kiosk_gateway::{BalanceUpdate, Rfid};

fn bench_register_unregister(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry-membership");
    let registry = Arc::new(ConnectionRegistry::new());
    let rfid = Rfid::from("RFID-BENCH");

    group.bench_function("join_and_drop", |b| {
        b.iter(|| {
            let (handle, _rx) = ConnectionHandle::channel(1);
            let registration = registry.join(rfid.clone(), handle);
            black_box(&registration);
        })
    });

    group.finish();
}

fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry-broadcast");
    group.measurement_time(Duration::from_secs(5));

    for room_size in [1usize, 10, 100] {
        let registry = ConnectionRegistry::new();
        let rfid = Rfid::from("RFID-ROOM");
        let receivers: Vec<_> = (0..room_size)
            .map(|_| {
                let (handle, rx) = ConnectionHandle::channel(1);
                registry.register(&rfid, handle);
                rx
            })
            .collect();
        let update = BalanceUpdate::new(rfid.clone(), 42);

        group.throughput(Throughput::Elements(room_size as u64));
        group.bench_with_input(
            BenchmarkId::new("balance_update", room_size),
            &room_size,
            |b, _| {
                // Queues stay full after the first round, so this measures
                // the snapshot + try_send path rather than allocation.
                b.iter(|| black_box(registry.broadcast_balance(&update)))
            },
        );
        drop(receivers);
    }

    let empty = ConnectionRegistry::new();
    let update = BalanceUpdate::new(Rfid::from("NOBODY"), 1);
    group.bench_function("absent_identity", |b| {
        b.iter(|| black_box(empty.broadcast_balance(&update)))
    });

    group.finish();
}

criterion_group!(benches, bench_register_unregister, bench_broadcast);
criterion_main!(benches);
