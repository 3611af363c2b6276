use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use request_guard_service::core::RateLimiter;
use request_guard_service::models::{RateLimitConfig, RequestIdentity};
use request_guard_service::store::MemoryLogStore;

fn rate_limiter_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("failed to build runtime");
    let store = Arc::new(MemoryLogStore::new());

    // A day of mixed traffic: 200 addresses across 8 endpoints.
    runtime.block_on(async {
        for i in 0..20_000i64 {
            let identity = RequestIdentity::new(
                format!("10.0.{}.{}", (i / 250) % 200, i % 250),
                Some(format!("endpoint-{}", i % 8)),
                Some(format!("device-{}", i % 500)),
            );
            store.insert_at(&identity, Utc::now() - Duration::seconds(i * 4)).await;
        }
    });

    let limiter = RateLimiter::new(store, RateLimitConfig::default());
    let identity = RequestIdentity::new(
        "10.0.3.17",
        Some("endpoint-1".to_string()),
        Some("device-42".to_string()),
    );

    c.bench_function("rate_limiter_check", |b| {
        b.iter(|| {
            runtime
                .block_on(limiter.check(black_box(&identity)))
                .expect("check failed")
        })
    });
}

criterion_group!(benches, rate_limiter_benchmark);
criterion_main!(benches);
