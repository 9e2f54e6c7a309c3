//! LEANN backend: an HNSW index whose full-precision vectors are only partly resident.
//!
//! Hub nodes keep their f32 vectors in memory; every other node is represented in
//! the graph by its int8 codes only. Search walks the graph for a candidate pool
//! of `k * rerank_factor`, then reranks with exact distances: hub vectors come from
//! memory, the rest are rehydrated through the injected [`VectorRecompute`]. A
//! candidate that cannot be rehydrated is scored against a zero vector and flagged
//! `degraded`; search never fails because of it.
//!
//! The graph sits behind a reader-writer lock: searches share it, inserts and
//! deletes take it exclusively. The lock is released before any recompute call.

use crate::cache::HubCache;
use crate::config::{HubConfig, AUTO_COMPACT_RATIO};
use crate::error::{MemoryError, Result};
use crate::hnsw::HnswSnapshot;
use crate::hnsw::{DistanceMetric, HnswConfig, HnswIndex};
use crate::storage::persistence;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Rehydrates the full vector of a non-resident node.
#[async_trait]
pub trait VectorRecompute: Send + Sync {
    async fn recompute(&self, id: &str) -> Result<Vec<f32>>;
}

/// Recompute hook, or the explicit absence of one.
#[derive(Clone)]
pub enum Recompute {
    Available(Arc<dyn VectorRecompute>),
    Unavailable,
}

impl std::fmt::Debug for Recompute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recompute::Available(_) => f.write_str("Available"),
            Recompute::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// One reranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendHit {
    pub id: String,
    /// Exact distance after rerank (lower is closer).
    pub distance: f32,
    /// The metric's natural value: similarity for cosine/dot, distance otherwise.
    pub raw_value: f32,
    pub from_hub_cache: bool,
    pub recomputed: bool,
    /// No usable vector was available; scored against a zero vector.
    pub degraded: bool,
    /// Insertion sequence, the tie-break key.
    pub seq: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStats {
    pub count: usize,
    pub tombstones: usize,
    pub hubs: usize,
    pub resident: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub memory_bytes: usize,
}

#[derive(Serialize, Deserialize)]
struct BackendSnapshot {
    index: HnswSnapshot,
    hub_vectors: Vec<(String, Vec<f32>)>,
}

pub struct LeannBackend {
    index: RwLock<HnswIndex>,
    hub: HubCache,
    recompute: Recompute,
    rerank_factor: usize,
}

impl LeannBackend {
    pub fn new(
        dimension: usize,
        hnsw: HnswConfig,
        hub: HubConfig,
        recompute: Recompute,
        rerank_factor: usize,
    ) -> Result<Self> {
        hnsw.validate()?;
        if dimension == 0 {
            return Err(MemoryError::InvalidConfig("dimension must be positive".into()));
        }
        Ok(Self {
            index: RwLock::new(HnswIndex::new(dimension, hnsw)),
            hub: HubCache::new(hub),
            recompute,
            rerank_factor: rerank_factor.max(1),
        })
    }

    pub fn dimension(&self) -> usize {
        self.index.read().dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.index.read().metric()
    }

    pub fn count(&self) -> usize {
        self.index.read().len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.read().contains(id)
    }

    /// Inserts a new vector. Fails on a wrong dimension or an existing ID.
    pub fn insert(&self, id: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        let id = id.into();
        let live = {
            let mut index = self.index.write();
            index.insert(id.clone(), &vector)?;
            index.len()
        };
        self.admit(&id, vector, live);
        Ok(())
    }

    /// Inserts or replaces. Returns `true` if an existing vector was replaced.
    pub fn upsert(&self, id: impl Into<String>, vector: Vec<f32>) -> Result<bool> {
        let id = id.into();
        let (replaced, live) = {
            let mut index = self.index.write();
            let replaced = index.upsert(id.clone(), &vector)?;
            (replaced, index.len())
        };
        if replaced {
            self.hub.remove(&id);
        }
        self.admit(&id, vector, live);
        Ok(replaced)
    }

    /// Keeps a fresh vector resident while the resident set is under the hub budget;
    /// the next hub refresh drops it if it did not make the cut.
    fn admit(&self, id: &str, vector: Vec<f32>, live: usize) {
        if self.hub.resident_count() < self.hub.hub_count(live) {
            self.hub.retain(id, Arc::new(vector));
        }
        self.hub.invalidate();
    }

    /// Removes `id`. Returns `false` if it was not present. Compacts the arena
    /// once tombstones exceed the auto-compaction ratio.
    pub fn delete(&self, id: &str) -> bool {
        let removed = {
            let mut index = self.index.write();
            let removed = index.delete(id);
            if removed && index.node_count > 0 {
                let ratio = index.deleted_count() as f32 / index.node_count as f32;
                if ratio > AUTO_COMPACT_RATIO {
                    index.compact();
                }
            }
            removed
        };
        if removed {
            self.hub.remove(id);
        }
        removed
    }

    pub fn clear(&self) {
        self.index.write().clear();
        self.hub.clear();
    }

    /// Current hub membership, sorted.
    pub fn hub_ids(&self) -> Vec<String> {
        let index = self.index.read();
        let mut ids: Vec<String> = self.hub.hub_ids(&index).iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Cumulative hub-cache hit ratio over all reranked candidates.
    pub fn cache_hit_ratio(&self) -> f64 {
        self.hub.hit_ratio()
    }

    pub fn stats(&self) -> BackendStats {
        let index = self.index.read();
        let hubs = self.hub.hub_ids(&index).len();
        BackendStats {
            count: index.len(),
            tombstones: index.deleted_count(),
            hubs,
            resident: self.hub.resident_count(),
            hits: self.hub.hits(),
            misses: self.hub.misses(),
            hit_ratio: self.hub.hit_ratio(),
            memory_bytes: index.memory_bytes(),
        }
    }

    /// Nearest `k` vectors to `query`, reranked with full-precision distances.
    pub async fn search(&self, query: &[f32], k: usize, exact: bool) -> Result<Vec<BackendHit>> {
        let (candidates, metric) = {
            let index = self.index.read();
            let pool = k.saturating_mul(self.rerank_factor);
            let candidates = index.search(query, pool, exact)?;
            // Refresh (if due) before resolving, so residents match the hub set
            self.hub.hub_ids(&index);
            (candidates, index.metric())
        };
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = Vec::with_capacity(candidates.len());
        let mut degraded_count = 0usize;
        for candidate in candidates {
            let (vector, from_hub_cache, recomputed) = match self.hub.resident(&candidate.id) {
                Some(v) => {
                    self.hub.record_hit();
                    (Some(v), true, false)
                }
                None => {
                    self.hub.record_miss();
                    match self.rehydrate(&candidate.id, query.len()).await {
                        Some(v) => (Some(v), false, true),
                        None => (None, false, false),
                    }
                }
            };
            let degraded = vector.is_none();
            let distance = match &vector {
                Some(v) => metric.distance_exact(query, v),
                None => {
                    degraded_count += 1;
                    metric.distance_exact(query, &vec![0.0; query.len()])
                }
            };
            hits.push(BackendHit {
                id: candidate.id,
                distance,
                raw_value: metric.raw_value(distance),
                from_hub_cache,
                recomputed,
                degraded,
                seq: candidate.seq,
            });
        }
        if degraded_count > 0 {
            tracing::warn!(
                degraded = degraded_count,
                recompute = ?self.recompute,
                "candidates scored without a usable vector"
            );
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.seq.cmp(&b.seq)));
        hits.truncate(k);
        self.hub.record_access(hits.iter().map(|h| h.id.as_str()));
        Ok(hits)
    }

    async fn rehydrate(&self, id: &str, dimension: usize) -> Option<Arc<Vec<f32>>> {
        let Recompute::Available(hook) = &self.recompute else {
            return None;
        };
        match hook.recompute(id).await {
            Ok(v) if v.len() == dimension => {
                let v = Arc::new(v);
                let is_hub = self.hub_ids_contains(id);
                if is_hub {
                    self.hub.retain(id, Arc::clone(&v));
                }
                Some(v)
            }
            Ok(v) => {
                tracing::warn!(
                    id,
                    got = v.len(),
                    expected = dimension,
                    "recomputed vector has wrong dimension"
                );
                None
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "recompute failed");
                None
            }
        }
    }

    fn hub_ids_contains(&self, id: &str) -> bool {
        let index = self.index.read();
        self.hub.hub_ids(&index).contains(id)
    }

    /// Serializes the index and resident hub vectors into a framed, checksummed buffer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let snap = {
            let index = self.index.read();
            BackendSnapshot {
                index: index.snapshot(),
                hub_vectors: self.hub.resident_entries(),
            }
        };
        let payload = bincode::serialize(&snap).map_err(|e| MemoryError::Corrupt(e.to_string()))?;
        Ok(persistence::frame(&payload))
    }

    /// Replaces the in-memory state with a buffer produced by [`LeannBackend::encode`].
    /// The stored dimension must match this backend's.
    pub fn restore(&self, raw: &[u8], path: &Path) -> Result<()> {
        let payload = persistence::unframe(raw, path)?;
        let snap: BackendSnapshot =
            bincode::deserialize(payload).map_err(|e| MemoryError::Corrupt(e.to_string()))?;
        let restored = HnswIndex::from_snapshot(snap.index, Some(self.dimension()))?;

        let mut index = self.index.write();
        if restored.metric() != index.metric() {
            tracing::info!(
                configured = %index.metric(),
                stored = %restored.metric(),
                "using metric stored in the index file"
            );
        }
        *index = restored;
        self.hub.clear();
        for (id, vector) in snap.hub_vectors {
            if index.contains(&id) && vector.len() == index.dimension {
                self.hub.retain(&id, Arc::new(vector));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for LeannBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeannBackend")
            .field("count", &self.count())
            .field("hub", &self.hub)
            .field("recompute", &self.recompute)
            .field("rerank_factor", &self.rerank_factor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubPolicy;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TableRecompute {
        vectors: HashMap<String, Vec<f32>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VectorRecompute for TableRecompute {
        async fn recompute(&self, id: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.vectors
                .get(id)
                .cloned()
                .ok_or_else(|| MemoryError::Embedding(format!("no vector for {id}")))
        }
    }

    fn corpus(n: usize) -> Vec<(String, Vec<f32>)> {
        (0..n)
            .map(|i| {
                let x = i as f32 * 0.37;
                (format!("v{i}"), vec![x.sin(), x.cos(), (x * 1.7).sin(), 0.5])
            })
            .collect()
    }

    fn hnsw() -> HnswConfig {
        HnswConfig {
            seed: Some(17),
            ..HnswConfig::default()
        }
    }

    fn hub(ratio: f32) -> HubConfig {
        HubConfig {
            ratio,
            policy: HubPolicy::Degree,
            refresh_interval_ms: 60_000,
        }
    }

    fn table(data: &[(String, Vec<f32>)]) -> Arc<TableRecompute> {
        Arc::new(TableRecompute {
            vectors: data.iter().cloned().collect(),
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_all_hubs_served_from_cache() {
        let backend = LeannBackend::new(4, hnsw(), hub(1.0), Recompute::Unavailable, 2).unwrap();
        let data = corpus(20);
        for (id, v) in &data {
            backend.insert(id.clone(), v.clone()).unwrap();
        }
        let hits = backend.search(&data[3].1, 5, false).await.unwrap();
        assert_eq!(hits[0].id, "v3");
        assert!(hits.iter().all(|h| h.from_hub_cache && !h.recomputed && !h.degraded));
        assert_eq!(backend.cache_hit_ratio(), 1.0);
    }

    #[tokio::test]
    async fn test_unavailable_recompute_degrades_without_error() {
        let backend = LeannBackend::new(4, hnsw(), hub(0.1), Recompute::Unavailable, 2).unwrap();
        for (id, v) in corpus(50) {
            backend.insert(id, v).unwrap();
        }
        let hits = backend.search(&[0.1, 0.9, 0.2, 0.5], 10, false).await.unwrap();
        assert_eq!(hits.len(), 10);
        let degraded = hits.iter().filter(|h| h.degraded).count();
        assert!(degraded > 0);
        assert!(hits
            .iter()
            .filter(|h| h.degraded)
            .all(|h| !h.recomputed && !h.from_hub_cache));
        assert_eq!(backend.hub_ids().len(), 5);
    }

    #[tokio::test]
    async fn test_recompute_rehydrates_and_retains_hubs() {
        let data = corpus(40);
        let hook = table(&data);
        let backend = LeannBackend::new(
            4,
            hnsw(),
            hub(0.25),
            Recompute::Available(hook.clone()),
            3,
        )
        .unwrap();
        for (id, v) in &data {
            backend.insert(id.clone(), v.clone()).unwrap();
        }
        let first = backend.search(&data[7].1, 5, false).await.unwrap();
        assert_eq!(first[0].id, "v7");
        assert!(first.iter().all(|h| !h.degraded));
        assert!(hook.calls.load(Ordering::SeqCst) > 0);

        // Hubs rehydrated on the first pass are resident on the second
        let second = backend.search(&data[7].1, 5, false).await.unwrap();
        let hubs = backend.hub_ids();
        for hit in &second {
            if hubs.contains(&hit.id) {
                assert!(hit.from_hub_cache, "{} should be resident", hit.id);
            } else {
                assert!(hit.recomputed, "{} should be recomputed", hit.id);
            }
        }
        assert!(backend.stats().resident <= hubs.len());
    }

    #[tokio::test]
    async fn test_search_orders_by_exact_distance() {
        let data = corpus(30);
        let backend = LeannBackend::new(
            4,
            hnsw(),
            hub(0.1),
            Recompute::Available(table(&data)),
            4,
        )
        .unwrap();
        for (id, v) in &data {
            backend.insert(id.clone(), v.clone()).unwrap();
        }
        let hits = backend.search(&data[0].1, 8, true).await.unwrap();
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert!((hits[0].raw_value - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_empty_and_wrong_dimension() {
        let backend = LeannBackend::new(4, hnsw(), hub(0.1), Recompute::Unavailable, 2).unwrap();
        assert!(backend.search(&[0.0; 4], 3, false).await.unwrap().is_empty());
        assert!(matches!(
            backend.search(&[0.0; 3], 3, false).await,
            Err(MemoryError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            backend.insert("x", vec![1.0; 5]),
            Err(MemoryError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_invalidates_and_compacts() {
        let backend = LeannBackend::new(4, hnsw(), hub(0.2), Recompute::Unavailable, 2).unwrap();
        for (id, v) in corpus(10) {
            backend.insert(id, v).unwrap();
        }
        let before = backend.hub_ids();
        let victim = before[0].clone();
        assert!(backend.delete(&victim));
        assert!(!backend.delete(&victim));
        assert!(!backend.hub_ids().contains(&victim));
        assert_eq!(backend.count(), 9);

        for i in 0..8 {
            backend.delete(&format!("v{i}"));
            let stats = backend.stats();
            let slots = stats.count + stats.tombstones;
            assert!(stats.tombstones as f32 <= AUTO_COMPACT_RATIO * slots as f32);
        }
    }

    #[tokio::test]
    async fn test_upsert_and_clear() {
        let backend = LeannBackend::new(4, hnsw(), hub(1.0), Recompute::Unavailable, 2).unwrap();
        backend.insert("a", vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        assert!(matches!(
            backend.insert("a", vec![0.0, 1.0, 0.0, 0.0]),
            Err(MemoryError::DuplicateId(_))
        ));
        assert!(backend.upsert("a", vec![0.0, 1.0, 0.0, 0.0]).unwrap());
        let hits = backend.search(&[0.0, 1.0, 0.0, 0.0], 1, false).await.unwrap();
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].distance < 1e-5);
        backend.clear();
        assert_eq!(backend.count(), 0);
        assert!(backend.hub_ids().is_empty());
    }

    #[tokio::test]
    async fn test_encode_restore_roundtrip() {
        let backend = LeannBackend::new(4, hnsw(), hub(0.5), Recompute::Unavailable, 2).unwrap();
        for (id, v) in corpus(25) {
            backend.insert(id, v).unwrap();
        }
        let q = [0.3, 0.6, -0.2, 0.5];
        let expected = backend.search(&q, 5, false).await.unwrap();
        let bytes = backend.encode().unwrap();

        let fresh = LeannBackend::new(4, hnsw(), hub(0.5), Recompute::Unavailable, 2).unwrap();
        fresh.restore(&bytes, Path::new("mem")).unwrap();
        assert_eq!(fresh.count(), 25);
        let got = fresh.search(&q, 5, false).await.unwrap();
        let ids = |hits: &[BackendHit]| hits.iter().map(|h| h.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&expected), ids(&got));

        let wrong_dim = LeannBackend::new(8, hnsw(), hub(0.5), Recompute::Unavailable, 2).unwrap();
        assert!(matches!(
            wrong_dim.restore(&bytes, Path::new("mem")),
            Err(MemoryError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_search_and_insert() {
        let backend = Arc::new(
            LeannBackend::new(4, hnsw(), hub(0.3), Recompute::Unavailable, 2).unwrap(),
        );
        for (id, v) in corpus(50) {
            backend.insert(id, v).unwrap();
        }
        let mut tasks = Vec::new();
        for t in 0..4 {
            let backend = Arc::clone(&backend);
            tasks.push(tokio::spawn(async move {
                for i in 0..25 {
                    if t == 0 {
                        let x = (100 + i) as f32;
                        backend.insert(format!("w{i}"), vec![x.sin(), x.cos(), 0.1, 0.5]).unwrap();
                    } else {
                        let hits = backend.search(&[0.2, 0.8, 0.1, 0.5], 5, false).await.unwrap();
                        assert_eq!(hits.len(), 5);
                    }
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(backend.count(), 75);
    }
}
