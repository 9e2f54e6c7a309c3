//! HNSW insertion algorithm.
//!
//! Inserts a vector into the HNSW graph with bidirectional connections and
//! heuristic neighbor pruning (Algorithm 4 from the HNSW paper).
//! Uses asymmetric f32-vs-i8 distance during construction unless raw vectors are stored.

use crate::error::{MemoryError, Result};
use crate::hnsw::graph::HnswIndex;
use crate::hnsw::search::search_layer;
use crate::hnsw::visited::VisitedSet;
use crate::quantization::QuantizedVector;
use std::collections::HashSet;

impl HnswIndex {
    /// Insert a new vector under `id`. Returns the node's internal ID.
    ///
    /// Fails with `DimensionMismatch` for a wrong-length vector and with `DuplicateId`
    /// if `id` is already live; use [`HnswIndex::upsert`] to replace instead.
    pub fn insert(&mut self, id: impl Into<String>, vector: &[f32]) -> Result<u32> {
        let id = id.into();
        self.validate_vector(&id, vector)?;
        if self.id_to_internal.contains_key(&id) {
            return Err(MemoryError::DuplicateId(id));
        }
        Ok(self.insert_unchecked(id, vector))
    }

    /// Insert or replace: an existing `id` is deleted first, then reinserted.
    /// Returns `true` if an existing node was replaced.
    pub fn upsert(&mut self, id: impl Into<String>, vector: &[f32]) -> Result<bool> {
        let id = id.into();
        self.validate_vector(&id, vector)?;
        let replaced = self.delete(&id);
        self.insert(id, vector)?;
        Ok(replaced)
    }

    fn validate_vector(&self, id: &str, vector: &[f32]) -> Result<()> {
        self.check_dimension(vector)?;
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(MemoryError::InvalidInput(format!(
                "vector for '{id}' contains non-finite components"
            )));
        }
        Ok(())
    }

    fn insert_unchecked(&mut self, id: String, raw_vector: &[f32]) -> u32 {
        let internal_id = self.node_count;
        let vector = QuantizedVector::quantize(raw_vector);
        let level = self.random_level();

        // First node (or first after everything was deleted): push SoA fields and return
        let Some(entry_point) = self.entry_point else {
            self.push_node(id, raw_vector, &vector, vec![Vec::new(); level + 1], level);
            self.entry_point = Some(internal_id);
            self.max_layer = level;
            return internal_id;
        };
        let mut current_ep = entry_point;

        // Precompute query norm squared for this raw_vector
        let query_norm_sq: f32 = raw_vector.iter().map(|&x| x * x).sum();

        // Allocate VisitedSet once, reuse across all search_layer calls
        let mut visited = VisitedSet::new(self.node_count as usize);

        // Phase 1: Greedily traverse from top layer down to node's level + 1
        for layer in (level + 1..=self.max_layer).rev() {
            let results = search_layer(
                self,
                raw_vector,
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

        // Phase 2: Search each layer and collect neighbors for the new node.
        // We collect all neighbor lists first, then push the node.
        let top = level.min(self.max_layer);
        let mut node_neighbors: Vec<Vec<u32>> = vec![Vec::new(); level + 1];

        let mut layer_eps: Vec<u32> = vec![current_ep];
        for layer in (0..=top).rev() {
            let candidates = search_layer(
                self,
                raw_vector,
                &layer_eps,
                self.config.ef_construction,
                layer,
                &mut visited,
                query_norm_sq,
            );

            let selected = select_neighbors_heuristic(self, &candidates, self.max_neighbors(layer));
            node_neighbors[layer] = selected.iter().map(|&(_, id)| id).collect();

            // Update entry points for next (lower) layer
            layer_eps.clear();
            layer_eps.extend(candidates.iter().map(|&(_, id)| id));
            if layer_eps.is_empty() {
                layer_eps.push(entry_point);
            }
        }

        self.push_node(id, raw_vector, &vector, node_neighbors, level);

        // Phase 3: Add bidirectional connections and prune over-capacity neighbors
        for layer in 0..=top {
            let my_neighbors: Vec<u32> = self.neighbors[internal_id as usize][layer].clone();
            for neighbor_id in my_neighbors {
                self.link(neighbor_id, internal_id, layer);
            }
        }

        // Update entry point if new node has higher layer
        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(internal_id);
        }
        internal_id
    }

    fn push_node(
        &mut self,
        id: String,
        raw_vector: &[f32],
        vector: &QuantizedVector,
        node_neighbors: Vec<Vec<u32>>,
        level: usize,
    ) {
        let internal_id = self.node_count;
        self.push_vector(vector);
        if self.config.store_raw_vectors {
            self.raw_vectors.extend_from_slice(raw_vector);
        }
        self.neighbors.push(node_neighbors);
        self.layers.push(level as u8);
        self.deleted.push(false);
        self.id_to_internal.insert(id.clone(), internal_id);
        self.ids.push(id);
        self.node_count += 1;
    }

    /// Adds the edge `from -> to` at `layer`, pruning `from`'s list with the
    /// heuristic if it exceeds the layer's cap.
    pub(crate) fn link(&mut self, from: u32, to: u32, layer: usize) {
        let m_max = self.max_neighbors(layer);
        let fid = from as usize;

        // Ensure the node has enough layer vecs
        while self.neighbors[fid].len() <= layer {
            self.neighbors[fid].push(Vec::new());
        }
        if self.neighbors[fid][layer].contains(&to) {
            return;
        }
        self.neighbors[fid][layer].push(to);

        if self.neighbors[fid][layer].len() > m_max {
            let base = self.vector(from);
            let base_norm_sq: f32 = base.iter().map(|&x| x * x).sum();
            let candidates: Vec<(f32, u32)> = self.neighbors[fid][layer]
                .iter()
                .map(|&cid| (self.distance_to(&base, cid, base_norm_sq), cid))
                .collect();
            let pruned = select_neighbors_heuristic(self, &candidates, m_max);
            self.neighbors[fid][layer] = pruned.iter().map(|&(_, id)| id).collect();
        }
    }
}

/// Heuristic neighbor selection (Algorithm 4 from the HNSW paper).
/// Prefers diverse neighbors: a candidate is selected only if it is closer to the base node
/// than to any already-selected neighbor. This avoids redundant clusters of near-identical
/// neighbors and ensures better graph connectivity, especially for cosine distance.
pub(crate) fn select_neighbors_heuristic(
    index: &HnswIndex,
    candidates: &[(f32, u32)],
    m: usize,
) -> Vec<(f32, u32)> {
    let mut sorted = candidates.to_vec();
    sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut selected: Vec<(f32, u32)> = Vec::with_capacity(m);

    for &(dist_to_base, cid) in &sorted {
        if selected.len() >= m {
            break;
        }

        // Reconstruct candidate once, then compare against all selected neighbors
        let cid_vec = index.vector(cid);
        let cid_norm_sq: f32 = cid_vec.iter().map(|&x| x * x).sum();
        let is_diverse = selected.iter().all(|&(_, sid)| {
            let dist_to_selected = index.distance_to(&cid_vec, sid, cid_norm_sq);
            dist_to_base <= dist_to_selected
        });

        if is_diverse {
            selected.push((dist_to_base, cid));
        }
    }

    // If heuristic didn't fill M slots, fill remaining with closest unused candidates
    if selected.len() < m {
        let selected_ids: HashSet<u32> = selected.iter().map(|&(_, id)| id).collect();
        for &(dist, cid) in &sorted {
            if selected.len() >= m {
                break;
            }
            if !selected_ids.contains(&cid) {
                selected.push((dist, cid));
            }
        }
    }

    selected
}
