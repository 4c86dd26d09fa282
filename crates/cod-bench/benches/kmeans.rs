// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use cod_bench::blob_points;
use cod_cluster::{KMeansConfig, kmeans};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn bench_kmeans(c: &mut Criterion, case_id: &str, n: usize, d: usize, k: usize, restarts: usize) {
    let points = blob_points(n, d, k, 7).expect("benchmark points should be valid");
    let config = KMeansConfig {
        restarts,
        ..KMeansConfig::with_k(k)
    };

    c.bench_function(case_id, |b| {
        b.iter(|| {
            kmeans(black_box(&points), black_box(&config))
                .expect("k-means benchmark should succeed");
        })
    });
}

fn benchmark_kmeans_n1e3_d20_k6(c: &mut Criterion) {
    bench_kmeans(c, "kmeans_n1e3_d20_k6_r100", 1_000, 20, 6, 100);
}

fn benchmark_kmeans_n5e3_d40_k6(c: &mut Criterion) {
    bench_kmeans(c, "kmeans_n5e3_d40_k6_r20", 5_000, 40, 6, 20);
}

criterion_group!(
    benches,
    benchmark_kmeans_n1e3_d20_k6,
    benchmark_kmeans_n5e3_d40_k6
);
criterion_main!(benches);
