use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use mesh_transfer::algs::communicator::NoComm;
use mesh_transfer::geometry::{BoundingBox, KdItem, KdTree};
use mesh_transfer::partitioning::{rcb_partition, RcbConfig};

fn random_points(n: usize, seed: u64) -> Vec<[f64; 3]> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..n)
        .map(|_| [rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()])
        .collect()
}

fn bench_rcb(c: &mut Criterion) {
    let mut group = c.benchmark_group("rcb");
    for &n in &[1_000usize, 10_000, 50_000] {
        let points = random_points(n, 42);
        let mut coords = vec![0.0f64; 3 * n];
        for (i, p) in points.iter().enumerate() {
            for d in 0..3 {
                coords[d * n + i] = p[d];
            }
        }
        let domain = BoundingBox::from_bounds(3, &[0.0; 3], &[1.0; 3]);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                rcb_partition(&NoComm, 3, &coords, None, &domain, 8, &RcbConfig::default())
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_kdtree_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("kdtree");
    for &n in &[1_000usize, 10_000] {
        let centers = random_points(n, 7);
        let items: Vec<KdItem> = centers
            .iter()
            .enumerate()
            .map(|(i, p)| KdItem {
                index: i,
                handle: i as u64,
                centroid: *p,
                bbox: BoundingBox::from_bounds(
                    3,
                    &[p[0] - 0.01, p[1] - 0.01, p[2] - 0.01],
                    &[p[0] + 0.01, p[1] + 0.01, p[2] + 0.01],
                ),
            })
            .collect();
        let tree = KdTree::build(items, 3);
        let queries = random_points(256, 99);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let mut hits = 0usize;
                for q in &queries {
                    if tree.containing_element(q, |_| Ok(true)).unwrap().is_some() {
                        hits += 1;
                    }
                }
                hits
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rcb, bench_kdtree_queries);
criterion_main!(benches);
