//! HNSW search algorithms: single-layer search, multi-layer KNN and brute force.
//!
//! Results are `(distance, internal_id)` pairs ordered by ascending distance, with
//! ties broken by internal ID, which is the insertion order.

use crate::error::Result;
use crate::hnsw::graph::{HnswIndex, SearchHit};
use crate::hnsw::visited::VisitedSet;
use ordered_float::OrderedFloat;
use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

thread_local! {
    /// Thread-local VisitedSet pool for search operations.
    /// Eliminates per-query allocations by reusing across searches on the same thread.
    static SEARCH_VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::new(0));
}

/// A candidate during search. Pops nearest first; equal distances pop lower IDs first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    neg_distance: OrderedFloat<f32>,
    id: Reverse<u32>,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.neg_distance
            .cmp(&other.neg_distance)
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A result entry. Max-heap by (distance, id) so the worst result is popped first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResultEntry {
    distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for ResultEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for ResultEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn sort_results(results: &mut [(f32, u32)]) {
    results.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
}

/// Search a single layer of the HNSW graph.
/// Returns the ef closest non-deleted nodes to the query at the given layer.
/// `visited` is a reusable VisitedSet (cleared at the start of each call).
/// `query_norm_sq` is the precomputed sum of squares of the query vector.
pub fn search_layer(
    index: &HnswIndex,
    query: &[f32],
    entry_points: &[u32],
    ef: usize,
    layer: usize,
    visited: &mut VisitedSet,
    query_norm_sq: f32,
) -> Vec<(f32, u32)> {
    visited.clear();
    visited.ensure_capacity(index.node_count as usize);
    let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef * 2);
    let mut results: BinaryHeap<ResultEntry> = BinaryHeap::with_capacity(ef + 1);
    // Cached worst distance — avoids repeated heap peeks in the hot loop
    let mut worst_dist = f32::MAX;

    for &ep in entry_points {
        if visited.insert(ep) {
            let dist = index.distance_to(query, ep, query_norm_sq);
            candidates.push(Candidate {
                neg_distance: OrderedFloat(-dist),
                id: Reverse(ep),
            });
            if !index.is_deleted(ep) {
                results.push(ResultEntry {
                    distance: OrderedFloat(dist),
                    id: ep,
                });
                if results.len() > ef {
                    results.pop();
                }
                if results.len() >= ef {
                    worst_dist = results.peek().map_or(f32::MAX, |r| r.distance.0);
                }
            }
        }
    }

    while let Some(candidate) = candidates.pop() {
        let c_dist = -candidate.neg_distance.0;

        // If the closest candidate is farther than the worst result, stop
        if results.len() >= ef && c_dist > worst_dist {
            break;
        }

        for &neighbor_id in index.neighbors_at(candidate.id.0, layer) {
            if !visited.insert(neighbor_id) {
                continue;
            }

            let dist = index.distance_to(query, neighbor_id, query_norm_sq);
            if results.len() < ef || dist < worst_dist {
                candidates.push(Candidate {
                    neg_distance: OrderedFloat(-dist),
                    id: Reverse(neighbor_id),
                });
                if !index.is_deleted(neighbor_id) {
                    results.push(ResultEntry {
                        distance: OrderedFloat(dist),
                        id: neighbor_id,
                    });
                    if results.len() > ef {
                        results.pop(); // remove worst
                    }
                    if results.len() >= ef {
                        worst_dist = results.peek().map_or(f32::MAX, |r| r.distance.0);
                    }
                }
            }
        }
    }

    results
        .into_sorted_vec()
        .into_iter()
        .map(|r| (r.distance.0, r.id))
        .collect()
}

/// Multi-layer KNN search through the HNSW graph.
/// Greedy descent with ef=1 through the upper layers, then an `ef_search`-bounded
/// search at layer 0. Returns up to `k` results.
pub fn knn_search(index: &HnswIndex, query: &[f32], k: usize) -> Vec<(f32, u32)> {
    let entry_point = match index.entry_point {
        Some(ep) => ep,
        None => return Vec::new(),
    };
    if k == 0 {
        return Vec::new();
    }

    SEARCH_VISITED.with(|cell| {
        let mut visited = cell.borrow_mut();
        visited.ensure_capacity(index.node_count as usize);

        // Precompute query norm squared (constant for this query)
        let query_norm_sq: f32 = query.iter().map(|&x| x * x).sum();

        let mut current_ep = entry_point;

        // Traverse from top layer down to layer 1, using ef=1
        for layer in (1..=index.max_layer).rev() {
            let results = search_layer(
                index,
                query,
                std::slice::from_ref(&current_ep),
                1,
                layer,
                &mut visited,
                query_norm_sq,
            );
            if let Some(&(_, nearest)) = results.first() {
                current_ep = nearest;
            }
        }

        let ef = index.config.ef_search.max(k);
        let mut results = search_layer(
            index,
            query,
            std::slice::from_ref(&current_ep),
            ef,
            0,
            &mut visited,
            query_norm_sq,
        );
        sort_results(&mut results);
        results.truncate(k);
        results
    })
}

/// Exact search: scores every live node. Used for verification and small indexes.
pub fn brute_force_search(index: &HnswIndex, query: &[f32], k: usize) -> Vec<(f32, u32)> {
    let query_norm_sq: f32 = query.iter().map(|&x| x * x).sum();
    let mut results: Vec<(f32, u32)> = (0..index.node_count)
        .filter(|&id| !index.is_deleted(id))
        .map(|id| (index.distance_to(query, id, query_norm_sq), id))
        .collect();
    sort_results(&mut results);
    results.truncate(k);
    results
}

impl HnswIndex {
    /// Returns up to `k` nearest live nodes ordered by ascending distance
    /// (ties by insertion order). `exact` switches to brute force.
    ///
    /// An empty index yields an empty result; a wrong-length query is an error.
    pub fn search(&self, query: &[f32], k: usize, exact: bool) -> Result<Vec<SearchHit>> {
        self.check_dimension(query)?;
        let raw = if exact {
            brute_force_search(self, query, k)
        } else {
            knn_search(self, query, k)
        };
        Ok(raw
            .into_iter()
            .map(|(distance, seq)| SearchHit {
                id: self.external_id(seq).to_string(),
                distance,
                seq,
            })
            .collect())
    }
}
