use leann_core::hnsw::{HnswConfig, HnswIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

const DIM: usize = 12;

fn build(count: usize, seed: u64) -> (HnswIndex, Vec<Vec<f32>>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<Vec<f32>> = (0..count)
        .map(|_| (0..DIM).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect();
    let mut index = HnswIndex::new(
        DIM,
        HnswConfig {
            seed: Some(seed),
            store_raw_vectors: true,
            ..HnswConfig::default()
        },
    );
    for (i, v) in data.iter().enumerate() {
        index.insert(format!("n{i}"), v).unwrap();
    }
    (index, data)
}

/// No live node may list a deleted node on any layer.
fn assert_no_dangling_edges(index: &HnswIndex) {
    let live: Vec<u32> = index
        .live_ids()
        .filter_map(|id| index.internal_id(id))
        .collect();
    for node in live {
        for layer in 0..=index.get_layer(node) as usize {
            for &nb in index.neighbors_at(node, layer) {
                assert!(
                    !index.is_deleted(nb),
                    "{} -> deleted {} on layer {layer}",
                    index.external_id(node),
                    index.external_id(nb)
                );
            }
        }
    }
}

#[test]
fn test_every_third_deleted() {
    let (mut index, data) = build(300, 1);
    let mut deleted = HashSet::new();
    for i in (0..300).step_by(3) {
        let id = format!("n{i}");
        assert!(index.delete(&id));
        deleted.insert(id);
    }
    assert_eq!(index.len(), 200);
    assert_eq!(index.deleted_count(), 100);
    assert_no_dangling_edges(&index);

    for (i, q) in data.iter().enumerate().take(60) {
        let hits = index.search(q, 10, false).unwrap();
        assert_eq!(hits.len(), 10);
        assert!(hits.iter().all(|h| !deleted.contains(&h.id)));
        if i % 3 != 0 {
            assert_eq!(hits[0].id, format!("n{i}"));
        }
    }
}

#[test]
fn test_graph_stays_navigable_after_heavy_deletion() {
    let (mut index, data) = build(400, 2);
    for i in 0..300 {
        index.delete(&format!("n{i}"));
    }
    assert_no_dangling_edges(&index);

    let mut found = 0;
    let mut total = 0;
    for q in data.iter().skip(300).take(50) {
        let exact: HashSet<String> = index
            .search(q, 5, true)
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        let approx = index.search(q, 5, false).unwrap();
        found += approx.iter().filter(|h| exact.contains(&h.id)).count();
        total += 5;
    }
    let recall = found as f64 / total as f64;
    assert!(recall >= 0.85, "recall after deletes = {recall:.3}");
}

#[test]
fn test_delete_down_to_one_node() {
    let (mut index, data) = build(50, 3);
    for i in 1..50 {
        assert!(index.delete(&format!("n{i}")));
    }
    let hits = index.search(&data[7], 3, false).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "n0");

    assert!(index.delete("n0"));
    assert!(index.is_empty());
    assert!(index.search(&data[0], 3, false).unwrap().is_empty());
}

#[test]
fn test_compaction_after_deletes_matches_exact_search() {
    let (mut index, data) = build(200, 4);
    for i in (0..200).step_by(2) {
        index.delete(&format!("n{i}"));
    }
    let before: Vec<Vec<String>> = data
        .iter()
        .take(20)
        .map(|q| index.search(q, 5, true).unwrap().into_iter().map(|h| h.id).collect())
        .collect();
    index.compact();
    assert_eq!(index.deleted_count(), 0);
    assert_eq!(index.len(), 100);
    assert_no_dangling_edges(&index);
    for (q, expected) in data.iter().take(20).zip(&before) {
        let after: Vec<String> = index
            .search(q, 5, true)
            .unwrap()
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(&after, expected);
    }
}
