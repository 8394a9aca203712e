//! Memoized call benchmarks.
//!
//! Run with: `cargo bench --bench memoize`
//!
//! Measures the per-call cost of the memoizer on hits and misses, with and
//! without an active isolated region, and the cost of entering a region.

use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use memokit::{IsolateOptions, Key, MemoizeBuilder, boxed, isolate, isolate_with, memoize};

const OPS: u64 = 10_000;

// ============================================================================
// Hit Latency
// ============================================================================

fn bench_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("memoize_hit");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("single_reference", |b| {
        let f = memoize(|(k,): &(Arc<u64>,)| **k + 1);
        let key = Arc::new(1u64);
        f.call((Arc::clone(&key),)).unwrap();
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                for _ in 0..OPS {
                    black_box(f.call((Arc::clone(&key),)).unwrap());
                }
            }
            start.elapsed()
        })
    });

    group.bench_function("reference_and_durable", |b| {
        let f = memoize(|(k, n, s): &(Arc<u64>, u64, String)| **k + n + s.len() as u64);
        let key = Arc::new(1u64);
        let label = String::from("label");
        for n in 0..64 {
            f.call((Arc::clone(&key), n, label.clone())).unwrap();
        }
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    black_box(f.call((Arc::clone(&key), i % 64, label.clone())).unwrap());
                }
            }
            start.elapsed()
        })
    });

    group.bench_function("boxed", |b| {
        let f = boxed(|(n,): &(u64,)| n * 2);
        let session = Arc::new(());
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    black_box(f.call(&session, (i % 64,)).unwrap());
                }
            }
            start.elapsed()
        })
    });

    group.bench_function("inside_region", |b| {
        let f = memoize(|(k,): &(Arc<u64>,)| **k + 1);
        let key = Arc::new(1u64);
        let options = IsolateOptions {
            pointer: Some(Key::string("bench-region")),
            ..IsolateOptions::default()
        };
        b.iter_custom(|iters| {
            isolate_with(options.clone(), || {
                let start = Instant::now();
                for _ in 0..iters {
                    for _ in 0..OPS {
                        black_box(f.call((Arc::clone(&key),)).unwrap());
                    }
                }
                start.elapsed()
            })
            .unwrap()
        })
    });

    group.finish();
}

// ============================================================================
// Miss Latency
// ============================================================================

fn bench_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("memoize_miss");
    group.throughput(Throughput::Elements(OPS));

    // Fresh key per call; dead keys are swept as the store grows.
    group.bench_function("fresh_reference", |b| {
        let f = memoize(|(k,): &(Arc<u64>,)| **k + 1);
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    black_box(f.call((Arc::new(i),)).unwrap());
                }
            }
            start.elapsed()
        })
    });

    group.bench_function("limited_durable", |b| {
        let f = MemoizeBuilder::new()
            .limit(32)
            .build(|(k, n): &(Arc<u64>, u64)| **k + n);
        let key = Arc::new(1u64);
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    black_box(f.call((Arc::clone(&key), i)).unwrap());
                }
            }
            start.elapsed()
        })
    });

    group.finish();
}

// ============================================================================
// Region Entry
// ============================================================================

fn bench_isolate(c: &mut Criterion) {
    let mut group = c.benchmark_group("isolate");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("empty_region", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    black_box(isolate(|| i).unwrap());
                }
            }
            start.elapsed()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_hit, bench_miss, bench_isolate);
criterion_main!(benches);
