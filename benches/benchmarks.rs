//! Performance benchmarks for Gantry.
//!
//! This module contains benchmarks for:
//! - State writes (flat and nested keys, with and without subscribers)
//! - Glob pattern matching for subscription dispatch
//! - Event bus publish fan-out
//!
//! Run with: `cargo bench`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use gantry::bus::{EventBus, Handler};
use gantry::state::{glob_match, StateManager};

fn bench_state_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_set");

    group.bench_function("flat_key", |b| {
        let state = Arc::new(StateManager::new());
        let mut value = 0_i64;
        b.iter(|| {
            value += 1;
            state.set("counter", json!(value), None);
        });
    });

    group.bench_function("nested_key", |b| {
        let state = Arc::new(StateManager::new());
        let mut value = 0_i64;
        b.iter(|| {
            value += 1;
            state.set("app.panels.sidebar.width", json!(value), None);
        });
    });

    group.bench_function("equal_value_noop", |b| {
        let state = Arc::new(StateManager::new());
        state.set("counter", json!(1), None);
        b.iter(|| state.set("counter", json!(1), None));
    });

    group.finish();
}

fn bench_notification_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_notify");

    for subscribers in [1_usize, 10, 100] {
        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                let state = Arc::new(StateManager::new());
                let hits = Arc::new(AtomicUsize::new(0));
                for _ in 0..subscribers / 2 {
                    let hits = hits.clone();
                    state.subscribe(
                        "bench.value",
                        Arc::new(move |_| {
                            hits.fetch_add(1, Ordering::Relaxed);
                        }),
                    );
                }
                for _ in 0..subscribers - subscribers / 2 {
                    let hits = hits.clone();
                    state.subscribe(
                        "bench.*",
                        Arc::new(move |_| {
                            hits.fetch_add(1, Ordering::Relaxed);
                        }),
                    );
                }

                let mut value = 0_i64;
                b.iter(|| {
                    value += 1;
                    state.set("bench.value", json!(value), None);
                });
            },
        );
    }

    group.finish();
}

fn bench_glob_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("glob_match");

    let cases = [
        ("exact", "app.panels.sidebar.width", "app.panels.sidebar.width"),
        ("trailing_star", "app.panels.*", "app.panels.sidebar.width"),
        ("inner_star", "app.*.width", "app.panels.sidebar.width"),
        ("mismatch", "other.*", "app.panels.sidebar.width"),
    ];
    for (name, pattern, text) in cases {
        group.bench_function(name, |b| {
            b.iter(|| glob_match(black_box(pattern), black_box(text)));
        });
    }

    group.finish();
}

fn bench_bus_publish(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
    let mut group = c.benchmark_group("bus_publish");

    for handlers in [1_usize, 10, 100] {
        group.throughput(Throughput::Elements(handlers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(handlers),
            &handlers,
            |b, &handlers| {
                let bus = EventBus::new();
                let hits = Arc::new(AtomicUsize::new(0));
                for _ in 0..handlers {
                    let hits = hits.clone();
                    bus.subscribe(
                        "bench.tick",
                        Handler::sync(move |_| {
                            hits.fetch_add(1, Ordering::Relaxed);
                        }),
                    );
                }

                b.iter(|| {
                    runtime.block_on(bus.publish("bench.tick", json!({ "n": 1 })));
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_state_writes,
    bench_notification_fanout,
    bench_glob_match,
    bench_bus_publish
);
criterion_main!(benches);
