//! HNSW deletion with neighbor repair.
//!
//! A deleted node is tombstoned in the arena and every edge pointing at it is
//! dropped. Nodes that lost an edge are reconnected from the deleted node's former
//! neighbors using the same heuristic as insertion, so the graph stays navigable.

use crate::hnsw::graph::HnswIndex;
use crate::hnsw::insert::select_neighbors_heuristic;

impl HnswIndex {
    /// Removes `id` from the index. Returns `false` if it was not present.
    ///
    /// After this call no neighbor list references the node and search never returns it.
    /// If the node was the entry point, the live node with the highest layer takes over
    /// (lowest internal ID on ties); an index emptied this way has no entry point.
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(internal) = self.id_to_internal.remove(id) else {
            return false;
        };
        let node = internal as usize;
        let former: Vec<Vec<u32>> = std::mem::take(&mut self.neighbors[node]);
        self.deleted[node] = true;

        // Sweep every live node for edges into the deleted one
        let mut affected: Vec<(u32, usize)> = Vec::new();
        for other in 0..self.node_count {
            if self.deleted[other as usize] {
                continue;
            }
            for (layer, list) in self.neighbors[other as usize].iter_mut().enumerate() {
                if let Some(pos) = list.iter().position(|&n| n == internal) {
                    list.remove(pos);
                    affected.push((other, layer));
                }
            }
        }

        for &(other, layer) in &affected {
            self.repair(other, layer, former.get(layer).map(Vec::as_slice).unwrap_or(&[]));
        }

        if self.entry_point == Some(internal) {
            self.elect_entry_point();
        }

        tracing::trace!(id, repaired = affected.len(), "HNSW node deleted");
        true
    }

    /// Rebuilds `node`'s list at `layer` from its surviving neighbors plus `orphans`.
    fn repair(&mut self, node: u32, layer: usize, orphans: &[u32]) {
        let mut pool: Vec<u32> = self.neighbors[node as usize][layer].clone();
        for &c in orphans {
            if c != node && !self.is_deleted(c) && !pool.contains(&c) {
                pool.push(c);
            }
        }
        let base = self.vector(node);
        let base_norm_sq: f32 = base.iter().map(|&x| x * x).sum();
        let candidates: Vec<(f32, u32)> = pool
            .iter()
            .map(|&c| (self.distance_to(&base, c, base_norm_sq), c))
            .collect();
        let selected = select_neighbors_heuristic(self, &candidates, self.max_neighbors(layer));
        self.neighbors[node as usize][layer] = selected.into_iter().map(|(_, c)| c).collect();
    }

    fn elect_entry_point(&mut self) {
        let mut best: Option<(u8, u32)> = None;
        for id in 0..self.node_count {
            if self.is_deleted(id) {
                continue;
            }
            let layer = self.get_layer(id);
            if best.map_or(true, |(l, _)| layer > l) {
                best = Some((layer, id));
            }
        }
        match best {
            Some((layer, id)) => {
                self.entry_point = Some(id);
                self.max_layer = layer as usize;
            }
            None => {
                self.entry_point = None;
                self.max_layer = 0;
            }
        }
    }
}
