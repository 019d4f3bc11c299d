//! Benchmarks for the maitre-engine seating components.
//!
//! Run with: cargo bench -p maitre-engine

use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use maitre_core::{Party, PartyId, PartyServiceState};
use maitre_engine::prelude::*;
use maitre_ext_memory::{MemoryHostDeskStore, MemoryWaitlistStore};

// =============================================================================
// FIXTURES
// =============================================================================

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime")
}

fn filled_waitlist(rt: &tokio::runtime::Runtime, depth: usize) -> Arc<Waitlist> {
    let bus = Arc::new(InProcessEventBus::new(Arc::new(EventRegistry::new())));
    let waitlist = Arc::new(Waitlist::new(
        Arc::new(MemoryWaitlistStore::new()),
        Arc::new(FixedRateEstimator::new(Duration::from_secs(60))),
        bus,
        16,
    ));
    rt.block_on(async {
        for i in 0..depth {
            waitlist
                .join(Party::new(PartyId::new(format!("seed-{i:05}")), "seed", 2))
                .await
                .unwrap();
        }
    });
    waitlist
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_waitlist_join_leave(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("waitlist");

    for depth in [10usize, 100, 1_000] {
        let waitlist = filled_waitlist(&rt, depth);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("join_then_leave_tail", depth),
            &depth,
            |b, _| {
                let mut seq = 0u64;
                b.iter(|| {
                    rt.block_on(async {
                        let id = PartyId::new(format!("bench-{seq}"));
                        seq += 1;
                        waitlist
                            .join(Party::new(id.clone(), "bench", 3))
                            .await
                            .unwrap();
                        waitlist.leave(&id).await.unwrap();
                    })
                });
            },
        );
    }
    group.finish();
}

fn bench_waitlist_scan(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("waitlist_scan");

    for depth in [100usize, 1_000] {
        let waitlist = filled_waitlist(&rt, depth);
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::new("full_scan", depth), &depth, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let mut scan = waitlist.scan();
                    let mut count = 0usize;
                    while scan.next().await.is_some() {
                        count += 1;
                    }
                    assert_eq!(count, depth);
                })
            });
        });
    }
    group.finish();
}

fn bench_hostdesk_optimistic_cycle(c: &mut Criterion) {
    let rt = runtime();
    let store = MemoryHostDeskStore::new(1_000);

    c.bench_function("hostdesk/preserve_transfer_complete", |b| {
        let mut seq = 0u64;
        b.iter(|| {
            rt.block_on(async {
                let id = PartyId::new(format!("cycle-{seq}"));
                seq += 1;
                let stats = store.stats().await.unwrap();
                store
                    .create_party_state(
                        PartyServiceState::preserve(id.clone(), 4),
                        Some(stats.version),
                    )
                    .await
                    .unwrap();
                store.transfer_to_occupied(&id).await.unwrap();
                store.end_party_state(&id).await.unwrap();
            })
        });
    });
}

fn bench_admission(c: &mut Criterion) {
    let rt = runtime();

    c.bench_function("manager/process_new_party", |b| {
        let engine = {
            let config = EngineConfig {
                total_capacity: 1_000_000,
                time_per_guest_secs: 60,
                ..EngineConfig::default()
            };
            SeatingEngine::builder()
                .with_config(config)
                .with_waitlist_store(Arc::new(MemoryWaitlistStore::new()))
                .with_hostdesk_store(Arc::new(MemoryHostDeskStore::new(1_000_000)))
                .with_processing_strategy(Arc::new(QueueFirstStrategy))
                .build()
                .unwrap()
        };
        let mut seq = 0u64;
        b.iter(|| {
            rt.block_on(async {
                let admission = engine
                    .process_new_party(&format!("party-{seq}"), 2)
                    .await
                    .unwrap();
                seq += 1;
                admission
            })
        });
    });
}

criterion_group!(
    benches,
    bench_waitlist_join_leave,
    bench_waitlist_scan,
    bench_hostdesk_optimistic_cycle,
    bench_admission,
);
criterion_main!(benches);
