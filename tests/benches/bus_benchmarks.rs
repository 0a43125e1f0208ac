//! # smsg Bus Benchmarks
//!
//! | Operation | Expectation |
//! |-----------|-------------|
//! | publish | linear in subscriber count |
//! | subscribe / unsubscribe | constant per entry |
//! | invoke_sync | handler cost plus one map lookup |
//! | invoke | one task spawn per call |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use smsg_bus::{BroadcastHandler, Bus, CallHandler};
use std::time::Duration;

// ============================================================================
// BROADCAST CHANNEL
// ============================================================================

fn bench_publish_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast-publish");
    group.measurement_time(Duration::from_secs(5));

    for subscribers in [1usize, 10, 100, 1000] {
        let bus = Bus::new();
        for _ in 0..subscribers {
            bus.subscribe("bench.evt", BroadcastHandler::new(|data| {
                black_box(data);
                Ok(())
            }))
            .unwrap();
        }
        let payload = json!({ "id": 1, "name": "bench" });

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, _| b.iter(|| bus.publish("bench.evt", black_box(payload.clone())).unwrap()),
        );
    }

    group.finish();
}

fn bench_publish_no_subscribers(c: &mut Criterion) {
    let bus = Bus::new();
    c.bench_function("broadcast-publish-dropped", |b| {
        b.iter(|| bus.publish("bench.nobody", black_box(json!(null))).unwrap())
    });
}

fn bench_subscribe_unsubscribe(c: &mut Criterion) {
    let bus = Bus::new();
    let handler = BroadcastHandler::new(|_| Ok(()));

    c.bench_function("broadcast-subscribe-unsubscribe", |b| {
        b.iter(|| {
            bus.subscribe("bench.churn", handler.clone()).unwrap();
            bus.unsubscribe("bench.churn", &handler).unwrap();
        })
    });
}

// ============================================================================
// CALL CHANNEL
// ============================================================================

fn bench_invoke_sync(c: &mut Criterion) {
    let bus = Bus::new();
    bus.register("bench.echo", CallHandler::new(Ok)).unwrap();

    let mut group = c.benchmark_group("call-invoke-sync");
    group.bench_function("registered", |b| {
        b.iter(|| bus.invoke_sync("bench.echo", black_box(json!(42))).unwrap())
    });
    group.bench_function("unregistered", |b| {
        b.iter(|| bus.invoke_sync("bench.missing", black_box(json!(42))).unwrap())
    });
    group.finish();
}

fn bench_invoke_deferred(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let bus = Bus::new();
    bus.register("bench.echo", CallHandler::new(Ok)).unwrap();

    let mut group = c.benchmark_group("call-invoke");
    for batch in [1usize, 100] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("batch", batch), &batch, |b, &batch| {
            b.iter(|| {
                runtime.block_on(async {
                    let pending: Vec<_> = (0..batch)
                        .map(|i| bus.invoke("bench.echo", json!(i)).unwrap())
                        .collect();
                    for reply in futures::future::join_all(pending).await {
                        black_box(reply.unwrap());
                    }
                })
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_publish_fan_out,
    bench_publish_no_subscribers,
    bench_subscribe_unsubscribe,
    bench_invoke_sync,
    bench_invoke_deferred,
);
criterion_main!(benches);
