//! # Cache Hot Path Benchmarks
//!
//! Key generation and the fresh-hit read path, which together make up the
//! cost of every cached read.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use http::Method;
use request_cache::caching::{compute_key, KeyPattern};
use request_cache::{transport_fn, RequestCache, RequestDescriptor};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::runtime::Runtime;

fn payload_with_fields(fields: usize) -> Value {
    let map: serde_json::Map<String, Value> = (0..fields)
        .map(|i| (format!("field_{}", i), json!({"id": i, "tags": ["a", "b"], "active": i % 2 == 0})))
        .collect();
    Value::Object(map)
}

/// Benchmark canonical key computation for growing payloads
fn benchmark_key_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_generation");

    for fields in [0usize, 8, 64, 512] {
        let payload = if fields == 0 { Value::Null } else { payload_with_fields(fields) };

        group.bench_with_input(BenchmarkId::new("compute_key", fields), &payload, |b, payload| {
            b.iter(|| compute_key(black_box(&Method::POST), black_box("/api/v1/search"), black_box(payload)))
        });
    }

    group.finish();
}

/// Benchmark reads served from fresh entries
fn benchmark_fresh_hits(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let transport = transport_fn(|request: RequestDescriptor| async move {
        Ok::<_, std::io::Error>(format!("body of {}", request.resource))
    });
    let cache = RequestCache::with_defaults(transport);
    let ttl = Duration::from_secs(3600);

    let requests: Vec<_> = (0..1000)
        .map(|i| RequestDescriptor::get(format!("/api/v1/users/{}", i)))
        .collect();

    rt.block_on(async {
        for request in &requests {
            cache.fetch(request, ttl).await.unwrap();
        }
    });

    c.bench_function("fresh_hit", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let request = &requests[i % requests.len()];
            i += 1;
            rt.block_on(async { black_box(cache.fetch(request, ttl).await.unwrap()) })
        })
    });
}

/// Benchmark pattern invalidation over a populated store
fn benchmark_pattern_invalidation(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let transport = transport_fn(|_request: RequestDescriptor| async move { Ok::<_, std::io::Error>(0u64) });
    let cache = RequestCache::with_defaults(transport);
    let pattern = KeyPattern::glob("/api/v1/orders/*").unwrap();

    c.bench_function("invalidate_pattern_10k", |b| {
        b.iter_batched(
            || {
                rt.block_on(async {
                    for i in 0..10_000 {
                        let resource = if i % 10 == 0 {
                            format!("/api/v1/orders/{}", i)
                        } else {
                            format!("/api/v1/users/{}", i)
                        };
                        cache
                            .fetch(&RequestDescriptor::get(resource), Duration::from_secs(60))
                            .await
                            .unwrap();
                    }
                })
            },
            |_| black_box(cache.invalidate_pattern(&pattern)),
            criterion::BatchSize::PerIteration,
        )
    });
}

criterion_group!(
    benches,
    benchmark_key_generation,
    benchmark_fresh_hits,
    benchmark_pattern_invalidation
);
criterion_main!(benches);
