//! Benchmarks for k-NN search: VP-tree against the linear scan.
//!
//! Run with: `cargo bench --bench search`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use posemirror::index::{linear_scan, search};
use posemirror::{Gallery, MetricKind, PoseRecord, PoseVector, VpTree};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const JOINTS: usize = 17;

fn random_pose(rng: &mut StdRng) -> (Vec<f32>, Vec<f32>) {
    let coordinates = (0..JOINTS * 2).map(|_| rng.gen_range(0.0f32..1.0)).collect();
    let confidence = (0..JOINTS).map(|_| rng.gen_range(0.3f32..=1.0)).collect();
    (coordinates, confidence)
}

fn random_gallery(n: usize, rng: &mut StdRng) -> Gallery {
    let records = (0..n)
        .map(|i| {
            let (coordinates, confidence) = random_pose(rng);
            PoseRecord::new(format!("pose-{}.jpg", i), coordinates, confidence)
        })
        .collect();
    Gallery::new(records, JOINTS).unwrap()
}

fn bench_knn(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let queries: Vec<PoseVector> = (0..32)
        .map(|_| {
            let (coordinates, confidence) = random_pose(&mut rng);
            PoseVector::new(coordinates, confidence)
        })
        .collect();

    for metric_kind in [MetricKind::Weighted, MetricKind::Cosine] {
        let metric = metric_kind.metric();
        let mut group = c.benchmark_group(format!("knn_{}", metric_kind.name()));

        for n in [1_000, 10_000] {
            let gallery = random_gallery(n, &mut rng);
            let tree = VpTree::build(&gallery, metric).unwrap();

            group.bench_with_input(BenchmarkId::new("vptree", n), &n, |b, _| {
                let mut i = 0;
                b.iter(|| {
                    let q = &queries[i % queries.len()];
                    i += 1;
                    black_box(search(&tree, &gallery, metric, q.view(), 5).unwrap())
                });
            });

            group.bench_with_input(BenchmarkId::new("linear_scan", n), &n, |b, _| {
                let mut i = 0;
                b.iter(|| {
                    let q = &queries[i % queries.len()];
                    i += 1;
                    black_box(linear_scan(&gallery, metric, q.view(), 5).unwrap())
                });
            });
        }
        group.finish();
    }
}

criterion_group!(benches, bench_knn);
criterion_main!(benches);
