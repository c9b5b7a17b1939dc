//! Core store benchmarks: insertion, point reads, and range scans. These
//! stand in for the driver program of a typical deployment — the numbers
//! that matter are inserts/sec and cached point-read latency.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::tempdir;

use burrow::BPlusTree;

fn filled_tree(count: usize) -> (tempfile::TempDir, BPlusTree) {
    let dir = tempdir().unwrap();
    let mut tree = BPlusTree::open(dir.path().join("bench.bpt")).unwrap();
    for i in 0..count {
        let key = format!("key{i:08}");
        let value = format!("value{i:08}");
        tree.put(key.as_bytes(), value.as_bytes()).unwrap();
    }
    (dir, tree)
}

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");

    for count in [1_000usize, 10_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(
            BenchmarkId::new("sequential", count),
            &count,
            |b, &count| {
                b.iter_with_setup(
                    || {
                        let dir = tempdir().unwrap();
                        let tree = BPlusTree::open(dir.path().join("bench.bpt")).unwrap();
                        (dir, tree)
                    },
                    |(dir, mut tree)| {
                        for i in 0..count {
                            let key = format!("key{i:08}");
                            let value = format!("value{i:08}");
                            tree.put(key.as_bytes(), value.as_bytes()).unwrap();
                        }
                        (dir, tree)
                    },
                );
            },
        );
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    for count in [1_000usize, 10_000] {
        let (_dir, tree) = filled_tree(count);
        group.bench_with_input(BenchmarkId::new("hit", count), &count, |b, &count| {
            let mut i = 0usize;
            b.iter(|| {
                let key = format!("key{:08}", i % count);
                i = i.wrapping_add(7919);
                black_box(tree.get(key.as_bytes()).unwrap())
            });
        });
        group.bench_with_input(BenchmarkId::new("miss", count), &count, |b, _| {
            b.iter(|| black_box(tree.get(b"missing-key").unwrap()));
        });
    }

    group.finish();
}

fn bench_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("range");

    let (_dir, tree) = filled_tree(10_000);
    for width in [100usize, 1_000] {
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::new("window", width), &width, |b, &width| {
            let lo = format!("key{:08}", 4_000);
            let hi = format!("key{:08}", 4_000 + width - 1);
            b.iter(|| black_box(tree.range(lo.as_bytes(), hi.as_bytes()).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_put, bench_get, bench_range);
criterion_main!(benches);
