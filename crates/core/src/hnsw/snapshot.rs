//! Serializable form of an [`HnswIndex`].
//!
//! The snapshot carries the full arena and graph so a restored index answers
//! queries identically. The metric travels as its name so files written with a
//! metric this build does not know fail with `UnknownMetric` rather than a decode error.

use crate::config::SNAPSHOT_FORMAT_VERSION;
use crate::error::{MemoryError, Result};
use crate::hnsw::distance::DistanceMetric;
use crate::hnsw::graph::{HnswConfig, HnswIndex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotParams {
    pub m: usize,
    pub m_max0: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub max_layers: usize,
    pub store_raw_vectors: bool,
    pub seed: Option<u64>,
}

/// Owned, bincode-friendly copy of an index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswSnapshot {
    pub format_version: u32,
    pub dimension: usize,
    pub metric: String,
    pub params: SnapshotParams,
    pub node_count: u32,
    pub ids: Vec<String>,
    pub layers: Vec<u8>,
    pub neighbors: Vec<Vec<Vec<u32>>>,
    pub codes: Vec<i8>,
    pub offsets: Vec<f32>,
    pub scales: Vec<f32>,
    pub raw_vectors: Vec<f32>,
    pub deleted: Vec<bool>,
    pub entry_point: Option<u32>,
    pub max_layer: usize,
}

impl HnswSnapshot {
    /// Structural checks: every per-node array sized to `node_count`, every edge
    /// in bounds and pointing at a live node, entry point live.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let nc = self.node_count as usize;
        let dim = self.dimension;

        if self.codes.len() != nc * dim {
            return Err(format!(
                "codes length {} != node_count({}) * dimension({})",
                self.codes.len(),
                nc,
                dim
            ));
        }
        for (name, len) in [
            ("offsets", self.offsets.len()),
            ("scales", self.scales.len()),
            ("ids", self.ids.len()),
            ("layers", self.layers.len()),
            ("neighbors", self.neighbors.len()),
            ("deleted", self.deleted.len()),
        ] {
            if len != nc {
                return Err(format!("{name} length {len} != node_count {nc}"));
            }
        }
        if self.params.store_raw_vectors && self.raw_vectors.len() != nc * dim {
            return Err(format!(
                "raw_vectors length {} != node_count({}) * dimension({})",
                self.raw_vectors.len(),
                nc,
                dim
            ));
        }

        for (node, node_layers) in self.neighbors.iter().enumerate() {
            if self.deleted[node] {
                continue;
            }
            if node_layers.len() > self.layers[node] as usize + 1 {
                return Err(format!(
                    "node {node} has {} neighbor layers but level {}",
                    node_layers.len(),
                    self.layers[node]
                ));
            }
            for list in node_layers {
                for &n in list {
                    if n as usize >= nc {
                        return Err(format!("node {node} links to out-of-range {n}"));
                    }
                    if self.deleted[n as usize] {
                        return Err(format!("node {node} links to deleted {n}"));
                    }
                }
            }
        }

        match self.entry_point {
            Some(ep) if ep as usize >= nc || self.deleted[ep as usize] => {
                Err(format!("entry point {ep} is not a live node"))
            }
            None if self.deleted.iter().any(|d| !d) => {
                Err("live nodes present but no entry point".to_string())
            }
            _ => Ok(()),
        }
    }
}

impl HnswIndex {
    /// Captures the index for persistence.
    pub fn snapshot(&self) -> HnswSnapshot {
        HnswSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            dimension: self.dimension,
            metric: self.metric().name().to_string(),
            params: SnapshotParams {
                m: self.config.m,
                m_max0: self.config.m_max0,
                ef_construction: self.config.ef_construction,
                ef_search: self.config.ef_search,
                max_layers: self.config.max_layers,
                store_raw_vectors: self.config.store_raw_vectors,
                seed: self.config.seed,
            },
            node_count: self.node_count,
            ids: self.ids.clone(),
            layers: self.layers.clone(),
            neighbors: self.neighbors.clone(),
            codes: self.codes.clone(),
            offsets: self.offsets.clone(),
            scales: self.scales.clone(),
            raw_vectors: self.raw_vectors.clone(),
            deleted: self.deleted.clone(),
            entry_point: self.entry_point,
            max_layer: self.max_layer,
        }
    }

    /// Rebuilds an index from a snapshot.
    ///
    /// `expected_dimension`, when given, must match the snapshot's dimension.
    pub fn from_snapshot(snap: HnswSnapshot, expected_dimension: Option<usize>) -> Result<Self> {
        if snap.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(MemoryError::Corrupt(format!(
                "unsupported index format version {}",
                snap.format_version
            )));
        }
        let metric: DistanceMetric = snap.metric.parse()?;
        if let Some(expected) = expected_dimension {
            if expected != snap.dimension {
                return Err(MemoryError::DimensionMismatch {
                    expected,
                    actual: snap.dimension,
                });
            }
        }
        snap.validate()
            .map_err(|e| MemoryError::Corrupt(format!("index validation failed: {e}")))?;

        let config = HnswConfig {
            m: snap.params.m,
            m_max0: snap.params.m_max0,
            ef_construction: snap.params.ef_construction,
            ef_search: snap.params.ef_search,
            max_layers: snap.params.max_layers,
            distance_metric: metric,
            store_raw_vectors: snap.params.store_raw_vectors,
            seed: snap.params.seed,
        };
        config.validate()?;

        let mut index = HnswIndex::new(snap.dimension, config);
        index.id_to_internal = snap
            .ids
            .iter()
            .enumerate()
            .filter(|&(i, _)| !snap.deleted[i])
            .map(|(i, id)| (id.clone(), i as u32))
            .collect();
        index.codes = snap.codes;
        index.offsets = snap.offsets;
        index.scales = snap.scales;
        index.raw_vectors = snap.raw_vectors;
        index.neighbors = snap.neighbors;
        index.layers = snap.layers;
        index.deleted = snap.deleted;
        index.ids = snap.ids;
        index.entry_point = snap.entry_point;
        index.max_layer = snap.max_layer;
        index.node_count = snap.node_count;
        index.reseed();
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(snap: &HnswSnapshot) -> Vec<u8> {
        bincode::serialize(snap).unwrap()
    }

    fn decode(bytes: &[u8]) -> Result<HnswSnapshot> {
        bincode::deserialize(bytes).map_err(|e| MemoryError::Corrupt(e.to_string()))
    }

    fn sample(store_raw: bool) -> HnswIndex {
        let mut index = HnswIndex::new(
            6,
            HnswConfig {
                seed: Some(21),
                store_raw_vectors: store_raw,
                distance_metric: DistanceMetric::Euclidean,
                ..HnswConfig::default()
            },
        );
        for i in 0..40 {
            let v: Vec<f32> = (0..6).map(|j| ((i * 6 + j) % 13) as f32 * 0.1).collect();
            index.insert(format!("v{i}"), &v).unwrap();
        }
        index.delete("v3");
        index
    }

    #[test]
    fn test_snapshot_restores_identical_results() {
        for store_raw in [false, true] {
            let index = sample(store_raw);
            let bytes = encode(&index.snapshot());
            let restored = HnswIndex::from_snapshot(decode(&bytes).unwrap(), Some(6)).unwrap();
            assert_eq!(restored.len(), index.len());
            assert!(!restored.contains("v3"));
            let q = [0.3, 0.1, 0.7, 0.2, 0.0, 0.5];
            assert_eq!(
                index.search(&q, 10, false).unwrap(),
                restored.search(&q, 10, false).unwrap()
            );
        }
    }

    #[test]
    fn test_dimension_mismatch_on_restore() {
        let snap = sample(false).snapshot();
        assert!(matches!(
            HnswIndex::from_snapshot(snap, Some(8)),
            Err(MemoryError::DimensionMismatch {
                expected: 8,
                actual: 6
            })
        ));
    }

    #[test]
    fn test_unknown_metric_on_restore() {
        let mut snap = sample(false).snapshot();
        snap.metric = "hamming".into();
        assert!(matches!(
            HnswIndex::from_snapshot(snap, None),
            Err(MemoryError::UnknownMetric(_))
        ));
    }

    #[test]
    fn test_corrupt_arrays_rejected() {
        let mut snap = sample(false).snapshot();
        snap.offsets.pop();
        assert!(matches!(
            HnswIndex::from_snapshot(snap, None),
            Err(MemoryError::Corrupt(_))
        ));

        let mut snap = sample(false).snapshot();
        snap.neighbors[0][0].push(10_000);
        assert!(matches!(
            HnswIndex::from_snapshot(snap, None),
            Err(MemoryError::Corrupt(_))
        ));
    }

    #[test]
    fn test_garbage_bytes_fail_decode() {
        assert!(matches!(decode(&[1, 2, 3]), Err(MemoryError::Corrupt(_))));
    }
}
