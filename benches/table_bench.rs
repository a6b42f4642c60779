//! Bulk-operation benchmarks: index-addressed vs packed slots, and the
//! cost of bucket contention (many buckets vs few).

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use slabhash::{PackedSlabHashMap, SlabHashMap, TableConfig};

fn keys(n: usize) -> (Vec<u32>, Vec<u32>) {
    let mut rng = fastrand::Rng::with_seed(1);
    let keys: Vec<u32> = (0..n as u32).map(|_| rng.u32(0..u32::MAX - 1)).collect();
    let values: Vec<u32> = keys.iter().map(|k| k ^ 0x5A5A).collect();
    (keys, values)
}

fn bench_bulk_insert(c: &mut Criterion) {
    let sizes: &[usize] = &[1 << 10, 1 << 14, 1 << 17];
    let mut group = c.benchmark_group("bulk_insert");

    for &n in sizes {
        let (k, v) = keys(n);
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("indexed", n), &n, |b, _| {
            b.iter(|| {
                let map: SlabHashMap<u32, u32> =
                    SlabHashMap::new(TableConfig::new((n / 16) as u32, n as u32 + 1)).unwrap();
                map.bulk_insert(black_box(&k), black_box(&v));
                black_box(map.len())
            })
        });
        group.bench_with_input(BenchmarkId::new("packed", n), &n, |b, _| {
            b.iter(|| {
                let map: PackedSlabHashMap<u32, u32> =
                    PackedSlabHashMap::new(TableConfig::new((n / 16) as u32, n as u32 + 1))
                        .unwrap();
                map.bulk_insert(black_box(&k), black_box(&v));
                black_box(map.len())
            })
        });
    }
    group.finish();
}

fn bench_bulk_search(c: &mut Criterion) {
    let n = 1 << 16;
    let (k, v) = keys(n);
    let mut group = c.benchmark_group("bulk_search");
    group.throughput(Throughput::Elements(n as u64));

    let map: SlabHashMap<u32, u32> =
        SlabHashMap::new(TableConfig::new((n / 16) as u32, n as u32 + 1)).unwrap();
    map.bulk_insert(&k, &v);

    group.bench_function("hit", |b| {
        b.iter(|| black_box(map.bulk_search(black_box(&k))))
    });

    let misses: Vec<u32> = (0..n as u32).map(|i| i | 0x8000_0000).collect();
    group.bench_function("mixed", |b| {
        b.iter(|| black_box(map.bulk_search(black_box(&misses))))
    });
    group.finish();
}

fn bench_contended_bucket(c: &mut Criterion) {
    // Everything hashes into a handful of buckets: long chains, heavy CAS
    // traffic on the same slabs.
    let n = 1 << 12;
    let (k, v) = keys(n);
    let mut group = c.benchmark_group("contended_bucket");
    group.throughput(Throughput::Elements(n as u64));

    group.bench_function("four_buckets", |b| {
        b.iter(|| {
            let map: SlabHashMap<u32, u32> =
                SlabHashMap::new(TableConfig::new(4, n as u32 + 1)).unwrap();
            map.bulk_insert(black_box(&k), black_box(&v));
            black_box(map.len())
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_bulk_insert,
    bench_bulk_search,
    bench_contended_bucket
);
criterion_main!(benches);
