//! Benchmark: kovan-mvtable performance

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use kovan_mvtable::{MvccTable, VersionedChain, pin};
use std::sync::Arc;
use std::thread;

const SMALL_OPS: u64 = 100;
const MEDIUM_OPS: u64 = 400;

const THREAD_COUNTS: &[usize] = &[1, 2, 4, 8];

/// Single-threaded puts of fresh keys
fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");

    for &size in &[SMALL_OPS, MEDIUM_OPS] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::new("fresh_keys", size), &size, |b, &size| {
            b.iter(|| {
                let table: MvccTable = MvccTable::default();
                for key in 1..=size {
                    table.put(black_box(key), key).unwrap();
                }
                table
            });
        });
    }

    group.finish();
}

/// Repeated updates layering versions onto the same keys
fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update");
    group.throughput(Throughput::Elements(SMALL_OPS));

    group.bench_function("layered_versions", |b| {
        let table: MvccTable = MvccTable::default();
        let mut round = 0;
        b.iter(|| {
            round += 1;
            for key in 1..=SMALL_OPS {
                table.put(black_box(key), round).unwrap();
            }
        });
    });

    group.finish();
}

/// Single-threaded gets over a populated table
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    for &size in &[SMALL_OPS, MEDIUM_OPS] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::new("hit", size), &size, |b, &size| {
            let table: MvccTable = MvccTable::default();
            for key in 1..=size {
                table.put(key, key * 2).unwrap();
            }
            b.iter(|| {
                let mut sum = 0;
                for key in 1..=size {
                    if let Some(v) = table.get(black_box(key)) {
                        sum += v;
                    }
                }
                sum
            });
        });
    }

    group.finish();
}

/// Lock-free readers while one writer is serialized on the write lock
fn bench_concurrent_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_get");
    group.sample_size(20);

    for &threads in THREAD_COUNTS {
        let ops_per_thread = MEDIUM_OPS;
        group.throughput(Throughput::Elements(ops_per_thread * threads as u64));

        group.bench_with_input(
            BenchmarkId::new("readers", threads),
            &threads,
            |b, &threads| {
                let table: Arc<MvccTable> = Arc::new(MvccTable::default());
                for key in 1..=ops_per_thread {
                    table.put(key, key).unwrap();
                }

                b.iter(|| {
                    let handles: Vec<_> = (0..threads)
                        .map(|_| {
                            let table = Arc::clone(&table);
                            thread::spawn(move || {
                                let mut found = 0;
                                for key in 1..=ops_per_thread {
                                    if table.get(black_box(key)).is_some() {
                                        found += 1;
                                    }
                                }
                                found
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

/// Raw chain insert and rollback cost
fn bench_chain_insert_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");

    group.bench_function("insert_delete_head", |b| {
        let chain = VersionedChain::new();
        {
            let guard = pin();
            chain.insert(0, 0u64, &guard);
        }
        let mut version = 0;
        b.iter(|| {
            version += 1;
            {
                let guard = pin();
                chain.insert(black_box(version), version, &guard);
            }
            chain.delete(version);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_put,
    bench_update,
    bench_get,
    bench_concurrent_get,
    bench_chain_insert_delete
);
criterion_main!(benches);
