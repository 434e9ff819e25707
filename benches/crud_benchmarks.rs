use std::collections::BTreeMap;

use bplus_tree::BPlusTree;
use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};

const N: usize = 10_000;

/// Branching factors to compare: the smallest legal one, a mid-size one and
/// the default.
const ORDERS: [usize; 3] = [4, 16, 128];

// ─── Helper functions to generate key sequences ─────────────────────────────

fn ordered_keys(n: usize) -> Vec<i64> {
    (0..n as i64).collect()
}

fn reverse_ordered_keys(n: usize) -> Vec<i64> {
    (0..n as i64).rev().collect()
}

fn random_keys(n: usize) -> Vec<i64> {
    // Use a simple LCG for deterministic pseudo-random sequence
    let mut keys = Vec::with_capacity(n);
    let mut x: u64 = 12345;
    for _ in 0..n {
        x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
        keys.push((x >> 33) as i64);
    }
    keys
}

fn key_patterns() -> [(&'static str, Vec<i64>); 3] {
    [
        ("ordered", ordered_keys(N)),
        ("reverse", reverse_ordered_keys(N)),
        ("random", random_keys(N)),
    ]
}

fn build_tree(order: usize, keys: &[i64]) -> BPlusTree<i64, i64> {
    let mut tree = BPlusTree::new(order).unwrap();
    tree.extend(keys.iter().map(|&k| (k, k)));
    tree
}

// ─── Benchmarks ─────────────────────────────────────────────────────────────

fn bench_insert(c: &mut Criterion) {
    for (pattern, keys) in key_patterns() {
        let mut group = c.benchmark_group(format!("insert_{pattern}"));

        for order in ORDERS {
            group.bench_function(BenchmarkId::new("BPlusTree", order), |b| {
                b.iter(|| build_tree(order, &keys));
            });
        }

        group.bench_function(BenchmarkId::new("BTreeMap", N), |b| {
            b.iter(|| keys.iter().map(|&k| (k, k)).collect::<BTreeMap<i64, i64>>());
        });

        group.finish();
    }
}

fn bench_find(c: &mut Criterion) {
    for (pattern, keys) in key_patterns() {
        let mut group = c.benchmark_group(format!("find_{pattern}"));

        for order in ORDERS {
            let tree = build_tree(order, &keys);
            group.bench_function(BenchmarkId::new("BPlusTree", order), |b| {
                b.iter(|| {
                    let mut sum = 0i64;
                    for &k in &keys {
                        if let Some(&v) = tree.find(&k) {
                            sum = sum.wrapping_add(v);
                        }
                    }
                    sum
                });
            });
        }

        let map: BTreeMap<i64, i64> = keys.iter().map(|&k| (k, k)).collect();
        group.bench_function(BenchmarkId::new("BTreeMap", N), |b| {
            b.iter(|| {
                let mut sum = 0i64;
                for &k in &keys {
                    if let Some(&v) = map.get(&k) {
                        sum = sum.wrapping_add(v);
                    }
                }
                sum
            });
        });

        group.finish();
    }
}

fn bench_remove(c: &mut Criterion) {
    for (pattern, keys) in key_patterns() {
        let mut group = c.benchmark_group(format!("remove_{pattern}"));

        for order in ORDERS {
            group.bench_function(BenchmarkId::new("BPlusTree", order), |b| {
                b.iter_batched(
                    || build_tree(order, &keys),
                    |mut tree| {
                        for &k in &keys {
                            tree.remove(&k);
                        }
                        tree
                    },
                    BatchSize::SmallInput,
                );
            });
        }

        group.bench_function(BenchmarkId::new("BTreeMap", N), |b| {
            b.iter_batched(
                || keys.iter().map(|&k| (k, k)).collect::<BTreeMap<i64, i64>>(),
                |mut map| {
                    for &k in &keys {
                        map.remove(&k);
                    }
                    map
                },
                BatchSize::SmallInput,
            );
        });

        group.finish();
    }
}

// ─── Criterion Groups ───────────────────────────────────────────────────────

criterion_group!(crud_benches, bench_insert, bench_find, bench_remove);

criterion_main!(crud_benches);
