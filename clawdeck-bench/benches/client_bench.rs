//! Request correlation and end-to-end round-trip benchmarks.

use clawdeck_client::correlator::Correlator;
use clawdeck_client::stats::ClientStats;
use clawdeck_client::transport::memory::MemoryConnector;
use clawdeck_client::{Client, ClientConfig};
use clawdeck_protocol::ResponseFrame;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures_util::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn bench_correlator_register_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlator_register_resolve");

    for count in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let correlator = Correlator::new(Arc::new(ClientStats::default()));
                let mut calls = Vec::with_capacity(count);
                for _ in 0..count {
                    let id = correlator.next_id();
                    calls.push(correlator.register(&id, "agents.list"));
                }
                for call in &calls {
                    let resolved = correlator.resolve(ResponseFrame::ok(call.id(), json!({})));
                    black_box(resolved);
                }
                black_box(correlator.pending_count())
            });
        });
    }

    group.finish();
}

fn bench_correlator_unmatched(c: &mut Criterion) {
    let correlator = Correlator::new(Arc::new(ClientStats::default()));

    c.bench_function("correlator_unmatched", |b| {
        b.iter(|| black_box(correlator.resolve(ResponseFrame::ok("no-such-id", json!(null)))));
    });
}

/// Connects a client to an in-process gateway that answers every request.
fn connected_client(rt: &Runtime) -> Client {
    rt.block_on(async {
        let (connector, mut server) = MemoryConnector::new();
        let config =
            ClientConfig::new("ws://127.0.0.1:9").with_request_timeout(Duration::from_secs(5));
        let client = Client::with_connector(config, Arc::new(connector));

        tokio::spawn(async move {
            let Some(mut peer) = server.accept().await else {
                return;
            };
            let Some(hello) = peer.recv_request().await else {
                return;
            };
            peer.send_frame(ResponseFrame::ok(hello.id, json!({"protocol": 3})));

            while let Some(req) = peer.recv_request().await {
                peer.send_frame(ResponseFrame::ok(
                    req.id,
                    json!([{"id": "main", "name": "Main", "status": "online"}]),
                ));
            }
        });

        client.connect().await.unwrap();
        client
    })
}

fn bench_request_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = connected_client(&rt);

    c.bench_function("request_round_trip", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(client.list_agents().await.unwrap()) });
    });

    client.disconnect();
}

fn bench_concurrent_requests(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = connected_client(&rt);

    let mut group = c.benchmark_group("concurrent_requests");

    for count in [10, 100] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.to_async(&rt).iter(|| async {
                let calls = (0..count).map(|_| client.send("agents.list", None));
                for result in join_all(calls).await {
                    black_box(result.unwrap());
                }
            });
        });
    }

    group.finish();
    client.disconnect();
}

criterion_group!(
    benches,
    bench_correlator_register_resolve,
    bench_correlator_unmatched,
    bench_request_round_trip,
    bench_concurrent_requests,
);

criterion_main!(benches);
