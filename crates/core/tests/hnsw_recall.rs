use leann_core::hnsw::{DistanceMetric, HnswConfig, HnswIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

const N: usize = 1000;
const DIM: usize = 16;
const QUERIES: usize = 100;
const K: usize = 10;

fn random_vectors(rng: &mut StdRng, count: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|_| (0..DIM).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

/// Exact top-k over the original f32 vectors.
fn ground_truth(metric: DistanceMetric, data: &[Vec<f32>], query: &[f32]) -> Vec<String> {
    let mut scored: Vec<(f32, usize)> = data
        .iter()
        .enumerate()
        .map(|(i, v)| (metric.distance_exact(query, v), i))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    scored.iter().take(K).map(|&(_, i)| format!("v{i}")).collect()
}

fn mean_recall(metric: DistanceMetric, store_raw_vectors: bool) -> f64 {
    let mut rng = StdRng::seed_from_u64(7);
    let data = random_vectors(&mut rng, N);
    let queries = random_vectors(&mut rng, QUERIES);

    let config = HnswConfig {
        distance_metric: metric,
        store_raw_vectors,
        seed: Some(42),
        ..HnswConfig::default()
    };
    let mut index = HnswIndex::new(DIM, config);
    for (i, v) in data.iter().enumerate() {
        index.insert(format!("v{i}"), v).unwrap();
    }
    assert_eq!(index.len(), N);

    let mut total = 0.0;
    for q in &queries {
        let truth: HashSet<String> = ground_truth(metric, &data, q).into_iter().collect();
        let hits = index.search(q, K, false).unwrap();
        assert_eq!(hits.len(), K);
        let found = hits.iter().filter(|h| truth.contains(&h.id)).count();
        total += found as f64 / K as f64;
    }
    total / QUERIES as f64
}

#[test]
fn test_recall_with_raw_vectors() {
    for metric in [DistanceMetric::Cosine, DistanceMetric::Euclidean] {
        let recall = mean_recall(metric, true);
        assert!(recall >= 0.9, "{metric}: recall@{K} = {recall:.3}");
    }
}

#[test]
fn test_recall_with_int8_codes_only() {
    for metric in [DistanceMetric::Cosine, DistanceMetric::Euclidean] {
        let recall = mean_recall(metric, false);
        assert!(recall >= 0.8, "{metric}: recall@{K} = {recall:.3}");
    }
}

#[test]
fn test_seeded_builds_are_reproducible() {
    let mut rng = StdRng::seed_from_u64(11);
    let data = random_vectors(&mut rng, 200);
    let build = || {
        let mut index = HnswIndex::new(
            DIM,
            HnswConfig {
                seed: Some(5),
                ..HnswConfig::default()
            },
        );
        for (i, v) in data.iter().enumerate() {
            index.insert(format!("v{i}"), v).unwrap();
        }
        index
    };
    let a = build();
    let b = build();
    for q in data.iter().take(20) {
        let ha: Vec<String> = a.search(q, 5, false).unwrap().into_iter().map(|h| h.id).collect();
        let hb: Vec<String> = b.search(q, 5, false).unwrap().into_iter().map(|h| h.id).collect();
        assert_eq!(ha, hb);
    }
}

#[test]
fn test_results_sorted_by_distance() {
    let mut rng = StdRng::seed_from_u64(3);
    let data = random_vectors(&mut rng, 300);
    let mut index = HnswIndex::with_default_config(DIM);
    for (i, v) in data.iter().enumerate() {
        index.insert(format!("v{i}"), v).unwrap();
    }
    for exact in [false, true] {
        let hits = index.search(&data[17], 20, exact).unwrap();
        assert_eq!(hits[0].id, "v17");
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }
}
