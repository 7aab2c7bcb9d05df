//! # Arena Benchmark
//!
//! Claim/release round trips against warm pools. After warm-up every claim
//! must be served from a bucket, never from the allocator.
//!
//! Run with: `cargo bench --package chronos_core --bench arena_benchmark`

#![allow(missing_docs)]

use chronos_core::ArrayArena;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_claim_release(c: &mut Criterion) {
    let arena = ArrayArena::new();
    let pool = arena.pool::<u64>();
    let mut group = c.benchmark_group("claim_release");

    for length in [16, 1_000, 100_000] {
        // Warm the bucket.
        let warm = pool.claim(length).unwrap();
        pool.release(warm, false).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, &length| {
            b.iter(|| {
                let array = pool.claim(black_box(length)).unwrap();
                pool.release(array, false).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_spawn_recycle(c: &mut Criterion) {
    let arena = ArrayArena::new();
    let pool = arena.pool::<u32>();
    let warm = pool.spawn(4_096).unwrap();
    pool.recycle(warm).unwrap();

    c.bench_function("spawn_recycle_4096", |b| {
        b.iter(|| {
            let buffer = pool.spawn(black_box(4_096)).unwrap();
            pool.recycle(buffer).unwrap();
        });
    });
}

fn bench_exact_length(c: &mut Criterion) {
    let arena = ArrayArena::new();
    let pool = arena.pool::<u8>();
    let warm = pool.claim_exact_length(200).unwrap();
    pool.release(warm, true).unwrap();

    c.bench_function("claim_exact_200", |b| {
        b.iter(|| {
            let array = pool.claim_exact_length(black_box(200)).unwrap();
            pool.release(array, true).unwrap();
        });
    });
}

criterion_group!(benches, bench_claim_release, bench_spawn_recycle, bench_exact_length);
criterion_main!(benches);
