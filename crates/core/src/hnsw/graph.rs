//! HNSW graph structure and configuration.
//!
//! [`HnswConfig`] defines tuning parameters (M, ef_construction, ef_search, distance metric).
//! [`HnswIndex`] stores the graph using Struct-of-Arrays layout for cache efficiency.

use crate::config;
use crate::error::{MemoryError, Result};
use crate::hnsw::distance::DistanceMetric;
use crate::quantization::{QuantizedVector, VectorRef};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration parameters for an HNSW index.
///
/// Controls the trade-off between build speed, search speed, recall, and memory usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Number of bidirectional links per node (except layer 0, which uses `m_max0`).
    pub m: usize,
    /// Maximum links per node at layer 0 (typically `2 * m`).
    pub m_max0: usize,
    /// Candidate list size during index construction.
    pub ef_construction: usize,
    /// Candidate list size during search (higher = better recall, slower).
    pub ef_search: usize,
    /// Maximum number of layers in the graph.
    pub max_layers: usize,
    /// Distance function for similarity computation.
    pub distance_metric: DistanceMetric,
    /// When true, stores raw f32 vectors next to the int8 codes for exact reranking.
    /// When false (default), only the quantized arena is kept (compact mode).
    pub store_raw_vectors: bool,
    /// Seed for layer assignment. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: config::HNSW_DEFAULT_M,
            m_max0: config::HNSW_DEFAULT_M * 2,
            ef_construction: config::HNSW_DEFAULT_EF_CONSTRUCTION,
            ef_search: config::HNSW_DEFAULT_EF_SEARCH,
            max_layers: config::HNSW_DEFAULT_MAX_LAYERS,
            distance_metric: DistanceMetric::Cosine,
            store_raw_vectors: false,
            seed: None,
        }
    }
}

impl HnswConfig {
    /// Rejects parameter combinations the graph cannot be built with.
    pub fn validate(&self) -> Result<()> {
        if self.m < 2 {
            return Err(MemoryError::InvalidConfig(format!(
                "m must be at least 2, got {}",
                self.m
            )));
        }
        if self.m_max0 < self.m {
            return Err(MemoryError::InvalidConfig(format!(
                "m_max0 ({}) must be >= m ({})",
                self.m_max0, self.m
            )));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(MemoryError::InvalidConfig(
                "ef_construction and ef_search must be positive".into(),
            ));
        }
        if self.max_layers == 0 || self.max_layers > u8::MAX as usize {
            return Err(MemoryError::InvalidConfig(format!(
                "max_layers must be in 1..=255, got {}",
                self.max_layers
            )));
        }
        Ok(())
    }
}

/// A search result from the index: caller-facing ID, internal distance and the
/// node's insertion sequence (used to break distance ties deterministically).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub distance: f32,
    pub seq: u32,
}

/// HNSW Index using Struct-of-Arrays (SoA) layout for cache-friendly access.
/// Quantized vector data is stored contiguously in an arena. No HnswNode struct.
///
/// Internal IDs are assigned in insertion order and double as the tie-break key.
/// Deleted nodes are tombstoned: their arena slot is kept until [`HnswIndex::compact`],
/// but no neighbor list ever references them.
#[derive(Debug, Clone)]
pub struct HnswIndex {
    pub config: HnswConfig,
    // SoA: quantized vector arena — all codes contiguous
    pub codes: Vec<i8>,
    pub offsets: Vec<f32>,
    pub scales: Vec<f32>,
    // SoA: raw f32 vector arena (populated only when store_raw_vectors=true)
    pub raw_vectors: Vec<f32>,
    // SoA: graph structure
    pub neighbors: Vec<Vec<Vec<u32>>>, // [node_id][layer][neighbor_ids]
    pub layers: Vec<u8>,
    pub deleted: Vec<bool>,
    // ID mapping
    pub ids: Vec<String>,
    pub id_to_internal: HashMap<String, u32>,
    // Index metadata
    pub entry_point: Option<u32>,
    pub max_layer: usize,
    pub dimension: usize,
    pub node_count: u32,
    rng: StdRng,
}

impl HnswIndex {
    /// Creates a new empty HNSW index with the given dimension and configuration.
    pub fn new(dimension: usize, config: HnswConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            codes: Vec::new(),
            offsets: Vec::new(),
            scales: Vec::new(),
            raw_vectors: Vec::new(),
            neighbors: Vec::new(),
            layers: Vec::new(),
            deleted: Vec::new(),
            ids: Vec::new(),
            id_to_internal: HashMap::new(),
            entry_point: None,
            max_layer: 0,
            dimension,
            node_count: 0,
            rng,
        }
    }

    /// Creates a new empty HNSW index with default configuration (cosine, M=16, ef_c=200).
    pub fn with_default_config(dimension: usize) -> Self {
        Self::new(dimension, HnswConfig::default())
    }

    /// Returns the number of non-deleted nodes in the index.
    pub fn len(&self) -> usize {
        self.id_to_internal.len()
    }

    /// Returns `true` if the index contains no non-deleted nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tombstoned slots still occupying the arena.
    pub fn deleted_count(&self) -> usize {
        self.node_count as usize - self.len()
    }

    pub fn metric(&self) -> DistanceMetric {
        self.config.distance_metric
    }

    /// Returns `true` if `id` is a live node.
    pub fn contains(&self, id: &str) -> bool {
        self.id_to_internal.contains_key(id)
    }

    /// Internal ID of a live node.
    pub fn internal_id(&self, id: &str) -> Option<u32> {
        self.id_to_internal.get(id).copied()
    }

    /// Caller-facing ID of a slot (live or tombstoned).
    #[inline]
    pub fn external_id(&self, internal_id: u32) -> &str {
        &self.ids[internal_id as usize]
    }

    /// Live caller-facing IDs in insertion order.
    pub fn live_ids(&self) -> impl Iterator<Item = &str> + '_ {
        (0..self.node_count)
            .filter(|&i| !self.is_deleted(i))
            .map(|i| self.external_id(i))
    }

    /// Fails unless `vector` has exactly `dimension` components.
    pub fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Generate a random layer for a new node using exponential distribution.
    pub fn random_level(&mut self) -> usize {
        let ml = 1.0 / (self.config.m as f64).ln();
        let r: f64 = self.rng.gen::<f64>().max(f64::MIN_POSITIVE);
        let level = (-r.ln() * ml).floor() as usize;
        level.min(self.config.max_layers - 1)
    }

    /// Maximum neighbor count at `layer`.
    #[inline]
    pub fn max_neighbors(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.m_max0
        } else {
            self.config.m
        }
    }

    /// Get a VectorRef for the given node. O(1) slice into contiguous arena.
    #[inline]
    pub fn get_vector_ref(&self, id: u32) -> VectorRef<'_> {
        let idx = id as usize;
        let start = idx * self.dimension;
        VectorRef {
            data: &self.codes[start..start + self.dimension],
            offset: self.offsets[idx],
            scale: self.scales[idx],
        }
    }

    /// Returns `true` if the node with the given internal ID has been deleted.
    #[inline]
    pub fn is_deleted(&self, id: u32) -> bool {
        self.deleted[id as usize]
    }

    /// Returns the layer assignment of the given node.
    #[inline]
    pub fn get_layer(&self, id: u32) -> u8 {
        self.layers[id as usize]
    }

    /// Store a new quantized vector in the arena.
    pub fn push_vector(&mut self, vector: &QuantizedVector) {
        self.codes.extend_from_slice(&vector.data);
        self.offsets.push(vector.offset);
        self.scales.push(vector.scale);
    }

    /// Get a raw f32 vector slice for the given node.
    /// Only valid when raw_vectors are populated (store_raw_vectors=true).
    #[inline]
    pub fn get_raw_vector(&self, id: u32) -> &[f32] {
        let start = id as usize * self.dimension;
        &self.raw_vectors[start..start + self.dimension]
    }

    /// Returns true if raw f32 vectors are available for exact distance computation.
    #[inline]
    pub fn has_raw_vectors(&self) -> bool {
        self.config.store_raw_vectors && !self.raw_vectors.is_empty()
    }

    /// Dequantize a node's vector into the provided buffer (no allocation).
    #[inline]
    pub fn dequantize_into(&self, id: u32, buf: &mut [f32]) {
        let vref = self.get_vector_ref(id);
        for (i, slot) in buf.iter_mut().enumerate().take(self.dimension) {
            *slot = vref.value(i);
        }
    }

    /// Best available reconstruction of a node's vector: the raw vector when stored,
    /// otherwise the dequantized codes.
    pub fn vector(&self, id: u32) -> Vec<f32> {
        if self.has_raw_vectors() {
            self.get_raw_vector(id).to_vec()
        } else {
            let mut buf = vec![0.0f32; self.dimension];
            self.dequantize_into(id, &mut buf);
            buf
        }
    }

    /// Distance from a full-precision query to a stored node.
    /// Exact when raw vectors are stored, asymmetric f32-vs-i8 otherwise.
    #[inline]
    pub fn distance_to(&self, query: &[f32], node_id: u32, query_norm_sq: f32) -> f32 {
        if self.has_raw_vectors() {
            self.config
                .distance_metric
                .distance_exact(query, self.get_raw_vector(node_id))
        } else {
            self.config.distance_metric.distance_asym(
                query,
                self.get_vector_ref(node_id),
                query_norm_sq,
            )
        }
    }

    /// Total number of edges of a node across all its layers.
    pub fn degree(&self, id: u32) -> usize {
        self.neighbors[id as usize].iter().map(Vec::len).sum()
    }

    /// Neighbor list of a node at a layer (empty if the node does not reach it).
    pub fn neighbors_at(&self, id: u32, layer: usize) -> &[u32] {
        self.neighbors[id as usize]
            .get(layer)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Removes every node, keeping configuration and dimension.
    pub fn clear(&mut self) {
        self.codes.clear();
        self.offsets.clear();
        self.scales.clear();
        self.raw_vectors.clear();
        self.neighbors.clear();
        self.layers.clear();
        self.deleted.clear();
        self.ids.clear();
        self.id_to_internal.clear();
        self.entry_point = None;
        self.max_layer = 0;
        self.node_count = 0;
    }

    /// Approximate heap bytes held by the arena and graph.
    pub fn memory_bytes(&self) -> usize {
        let edges: usize = self
            .neighbors
            .iter()
            .flat_map(|layers| layers.iter().map(Vec::len))
            .sum();
        self.codes.len()
            + (self.offsets.len() + self.scales.len() + self.raw_vectors.len()) * 4
            + edges * 4
            + self.layers.len()
            + self.deleted.len()
            + self.ids.iter().map(String::len).sum::<usize>()
    }

    /// Rebuilds the arena without tombstoned slots. Internal IDs are renumbered
    /// preserving insertion order; layer assignments and edges are kept as they are.
    pub fn compact(&mut self) {
        if self.deleted_count() == 0 {
            return;
        }
        let dim = self.dimension;
        let mut remap: Vec<Option<u32>> = vec![None; self.node_count as usize];
        let mut next = 0u32;
        for old in 0..self.node_count {
            if !self.is_deleted(old) {
                remap[old as usize] = Some(next);
                next += 1;
            }
        }

        let has_raw = self.has_raw_vectors();
        let mut codes = Vec::with_capacity(next as usize * dim);
        let mut offsets = Vec::with_capacity(next as usize);
        let mut scales = Vec::with_capacity(next as usize);
        let mut raw = Vec::with_capacity(if has_raw { next as usize * dim } else { 0 });
        let mut neighbors = Vec::with_capacity(next as usize);
        let mut layers = Vec::with_capacity(next as usize);
        let mut ids = Vec::with_capacity(next as usize);

        for old in 0..self.node_count {
            if remap[old as usize].is_none() {
                continue;
            }
            let o = old as usize;
            codes.extend_from_slice(&self.codes[o * dim..(o + 1) * dim]);
            offsets.push(self.offsets[o]);
            scales.push(self.scales[o]);
            if has_raw {
                raw.extend_from_slice(self.get_raw_vector(old));
            }
            let node_layers: Vec<Vec<u32>> = self.neighbors[o]
                .iter()
                .map(|list| {
                    list.iter()
                        .filter_map(|&n| remap[n as usize])
                        .collect()
                })
                .collect();
            neighbors.push(node_layers);
            layers.push(self.layers[o]);
            ids.push(std::mem::take(&mut self.ids[o]));
        }

        self.codes = codes;
        self.offsets = offsets;
        self.scales = scales;
        self.raw_vectors = raw;
        self.neighbors = neighbors;
        self.layers = layers;
        self.deleted = vec![false; next as usize];
        self.id_to_internal = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i as u32))
            .collect();
        self.ids = ids;
        self.entry_point = self.entry_point.and_then(|ep| remap[ep as usize]);
        self.node_count = next;
        tracing::debug!(live = next, "HNSW arena compacted");
    }

    /// Re-derives the index's RNG after a restore so level generation continues
    /// deterministically for seeded configs.
    pub(crate) fn reseed(&mut self) {
        self.rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ self.node_count as u64),
            None => StdRng::from_entropy(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_level_bounded_and_sparse() {
        let mut index = HnswIndex::new(
            4,
            HnswConfig {
                seed: Some(42),
                ..HnswConfig::default()
            },
        );
        let levels: Vec<usize> = (0..10_000).map(|_| index.random_level()).collect();
        assert!(levels.iter().all(|&l| l < index.config.max_layers));
        let zero = levels.iter().filter(|&&l| l == 0).count();
        let one = levels.iter().filter(|&&l| l == 1).count();
        // P(level >= 1) = 1/M = 1/16
        assert!(zero > 9_000, "layer 0 should dominate, got {zero}");
        assert!(one > 300 && one < 900, "layer 1 count off: {one}");
    }

    #[test]
    fn test_seeded_levels_reproducible() {
        let config = HnswConfig {
            seed: Some(9),
            ..HnswConfig::default()
        };
        let mut a = HnswIndex::new(4, config.clone());
        let mut b = HnswIndex::new(4, config);
        let la: Vec<usize> = (0..100).map(|_| a.random_level()).collect();
        let lb: Vec<usize> = (0..100).map(|_| b.random_level()).collect();
        assert_eq!(la, lb);
    }

    #[test]
    fn test_config_validation() {
        assert!(HnswConfig::default().validate().is_ok());
        let bad = HnswConfig {
            m: 1,
            ..HnswConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = HnswConfig {
            m_max0: 4,
            ..HnswConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_check_dimension() {
        let index = HnswIndex::with_default_config(3);
        assert!(index.check_dimension(&[1.0, 2.0, 3.0]).is_ok());
        assert!(matches!(
            index.check_dimension(&[1.0]),
            Err(MemoryError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        ));
    }
}
