//! Benchmarks for the request-path hot spots.
//!
//! Benchmarks cover:
//! - Cache set/get under the entry bound (with and without eviction)
//! - Pattern invalidation over a populated store
//! - Admission checks across many clients

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use opportunity_guard::config::{CacheConfig, Category};
use opportunity_guard::core::{AdmissionController, CacheStore};
use serde_json::{json, Value};

// ============================================================================
// Helper Functions
// ============================================================================

fn build_cache(max_entries: usize) -> CacheStore<Value> {
    CacheStore::new(&CacheConfig {
        max_entries,
        ..CacheConfig::default()
    })
}

fn populate(cache: &CacheStore<Value>, count: usize) {
    for i in 0..count {
        cache.set_at(format!("deals:{}:{i}", i % 8), json!({"id": i, "title": "sample"}), None, 0);
    }
}

// ============================================================================
// Cache Benchmarks
// ============================================================================

fn bench_cache_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_get");
    for size in [100usize, 1_000, 10_000] {
        let cache = build_cache(size);
        populate(&cache, size);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 1) % size;
                black_box(cache.get_at(&format!("deals:{}:{i}", i % 8), 1));
            });
        });
    }
    group.finish();
}

fn bench_cache_set_with_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_set_evicting");
    for size in [100usize, 1_000] {
        let cache = build_cache(size);
        populate(&cache, size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                black_box(cache.set_at(format!("fresh:{i}"), json!(i), None, 0));
            });
        });
    }
    group.finish();
}

fn bench_invalidate_by_pattern(c: &mut Criterion) {
    c.bench_function("cache_invalidate_pattern_1000", |b| {
        b.iter_batched(
            || {
                let cache = build_cache(1_000);
                populate(&cache, 1_000);
                cache
            },
            |cache| black_box(cache.invalidate_by_pattern("^deals:3:")),
            criterion::BatchSize::LargeInput,
        );
    });
}

// ============================================================================
// Admission Benchmarks
// ============================================================================

fn bench_admission_checks(c: &mut Criterion) {
    let mut group = c.benchmark_group("admission_is_allowed");
    for clients in [10usize, 1_000] {
        let limiter = AdmissionController::default();
        group.bench_with_input(BenchmarkId::from_parameter(clients), &clients, |b, &clients| {
            let mut i = 0usize;
            let mut now = 0u64;
            b.iter(|| {
                i = (i + 1) % clients;
                now += 1;
                black_box(limiter.is_allowed_at(&format!("client-{i}"), Category::Api, now));
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_cache_get,
    bench_cache_set_with_eviction,
    bench_invalidate_by_pattern,
    bench_admission_checks
);
criterion_main!(benches);
