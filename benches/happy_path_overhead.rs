//! Overhead of a `ProtectedResource` call on the happy path, with no contention and no
//! tripped breaker, against a bare async closure baseline.

use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use ward::{BreakerStrategy, ProtectedResource};
use ward_bulkhead::{Bulkhead, BulkheadConfig};
use ward_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig};

#[derive(Debug, Clone)]
struct BenchError;
impl std::fmt::Display for BenchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bench error")
    }
}
impl std::error::Error for BenchError {}

fn bulkhead_only(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let resource = ProtectedResource::<BenchError>::new(
        "bench",
        Bulkhead::new(BulkheadConfig::builder().tickets(64).build().unwrap()),
        BreakerStrategy::None,
    );

    c.bench_function("protected_resource_bulkhead_only", |b| {
        b.to_async(&rt).iter(|| async {
            let result = resource.acquire(|| async { Ok::<_, BenchError>(1) }).await;
            black_box(result.unwrap())
        });
    });
}

fn bulkhead_plus_classic_breaker(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let breaker = CircuitBreaker::new(
        CircuitBreakerConfig::builder()
            .error_threshold(1000)
            .error_threshold_timeout(Duration::from_secs(60))
            .build()
            .unwrap(),
    );
    let resource = ProtectedResource::new(
        "bench",
        Bulkhead::new(BulkheadConfig::builder().tickets(64).build().unwrap()),
        BreakerStrategy::Classic(breaker),
    );

    c.bench_function("protected_resource_bulkhead_plus_classic", |b| {
        b.to_async(&rt).iter(|| async {
            let result = resource.acquire(|| async { Ok::<_, BenchError>(1) }).await;
            black_box(result.unwrap())
        });
    });
}

fn bare_async_baseline(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    c.bench_function("bare_async_baseline", |b| {
        b.to_async(&rt).iter(|| async { black_box(Ok::<_, BenchError>(1)).unwrap() });
    });
}

criterion_group!(benches, bare_async_baseline, bulkhead_only, bulkhead_plus_classic_breaker);
criterion_main!(benches);
