//! Frame encoding/decoding benchmarks.

use clawdeck_protocol::{Decoder, Encoder, EventFrame, Frame, RequestFrame, ResponseFrame};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn create_test_request(payload_size: usize) -> RequestFrame {
    RequestFrame::new("42", "chat.send").with_params(serde_json::json!({
        "agentId": "main",
        "message": "x".repeat(payload_size),
    }))
}

fn create_test_response(items: usize) -> ResponseFrame {
    let agents: Vec<_> = (0..items)
        .map(|i| {
            serde_json::json!({
                "id": format!("agent-{}", i),
                "name": format!("Agent {}", i),
                "status": "online",
                "model": "model-large",
                "enabled": true,
                "contextUsage": {"used": 1200, "total": 200000},
            })
        })
        .collect();
    ResponseFrame::ok("42", serde_json::Value::Array(agents))
}

fn bench_request_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_encode");

    for size in [100, 1000, 10000] {
        let request = create_test_request(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &request, |b, request| {
            b.iter(|| black_box(Encoder::encode_request(request).unwrap()));
        });
    }

    group.finish();
}

fn bench_request_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_decode");

    for size in [100, 1000, 10000] {
        let encoded = Encoder::encode_request(&create_test_request(size)).unwrap();

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| black_box(Decoder::decode(encoded).unwrap()));
        });
    }

    group.finish();
}

fn bench_response_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_encode");

    for items in [1, 10, 100] {
        let frame = Frame::from(create_test_response(items));

        group.throughput(Throughput::Elements(items as u64));
        group.bench_with_input(BenchmarkId::from_parameter(items), &frame, |b, frame| {
            b.iter(|| black_box(Encoder::encode(frame).unwrap()));
        });
    }

    group.finish();
}

fn bench_response_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("response_decode");

    for items in [1, 10, 100] {
        let encoded = Encoder::encode(&Frame::from(create_test_response(items))).unwrap();

        group.throughput(Throughput::Elements(items as u64));
        group.bench_with_input(BenchmarkId::from_parameter(items), &encoded, |b, encoded| {
            b.iter(|| black_box(Decoder::decode(encoded).unwrap()));
        });
    }

    group.finish();
}

fn bench_event_decode(c: &mut Criterion) {
    let event = EventFrame::new(
        "log",
        serde_json::json!({
            "timestamp": "2026-01-01T00:00:00Z",
            "level": "info",
            "message": "agent main finished a turn",
            "agentId": "main",
        }),
    )
    .with_seq(1234);
    let encoded = Encoder::encode(&Frame::from(event)).unwrap();

    c.bench_function("event_decode", |b| {
        b.iter(|| black_box(Decoder::decode(&encoded).unwrap()));
    });
}

fn bench_decode_malformed(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_malformed");

    for (name, text) in [
        ("not_json", "definitely not json"),
        ("missing_type", r#"{"id":"1","ok":true}"#),
        ("unknown_type", r#"{"type":"ping","id":"1"}"#),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| black_box(Decoder::decode(text).is_err()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_request_encode,
    bench_request_decode,
    bench_response_encode,
    bench_response_decode,
    bench_event_decode,
    bench_decode_malformed,
);

criterion_main!(benches);
