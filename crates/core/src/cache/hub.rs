//! Hub cache: the minority of nodes whose full-precision vectors stay resident.
//!
//! Hub membership is a policy decision layered over the graph. The set is computed
//! lazily: inserts and deletes mark the current snapshot stale, and the next read
//! (or any read after the refresh interval has elapsed) recomputes it from the
//! index. Residents outside the fresh hub set are dropped on every refresh.

use crate::config::{HubConfig, HubPolicy};
use crate::hnsw::HnswIndex;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

struct HubSnapshot {
    ids: Arc<HashSet<String>>,
    refreshed_at: Instant,
    stale: bool,
}

pub struct HubCache {
    config: HubConfig,
    resident: RwLock<HashMap<String, Arc<Vec<f32>>>>,
    snapshot: Mutex<Option<HubSnapshot>>,
    access_counts: Mutex<HashMap<String, u64>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HubCache {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            resident: RwLock::new(HashMap::new()),
            snapshot: Mutex::new(None),
            access_counts: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Current hub set, refreshed from `index` if stale or older than the poll interval.
    pub fn hub_ids(&self, index: &HnswIndex) -> Arc<HashSet<String>> {
        let mut snapshot = self.snapshot.lock();
        if let Some(snap) = snapshot.as_ref() {
            if !snap.stale && snap.refreshed_at.elapsed() < self.config.refresh_interval() {
                return Arc::clone(&snap.ids);
            }
        }

        let ids = Arc::new(self.select_hubs(index));
        self.resident.write().retain(|id, _| ids.contains(id));
        tracing::debug!(
            hubs = ids.len(),
            live = index.len(),
            policy = ?self.config.policy,
            "hub set refreshed"
        );
        *snapshot = Some(HubSnapshot {
            ids: Arc::clone(&ids),
            refreshed_at: Instant::now(),
            stale: false,
        });
        ids
    }

    /// Number of hubs for `live` nodes: `ceil(ratio * live)`.
    pub fn hub_count(&self, live: usize) -> usize {
        ((self.config.ratio as f64 * live as f64).ceil() as usize).min(live)
    }

    fn select_hubs(&self, index: &HnswIndex) -> HashSet<String> {
        let count = self.hub_count(index.len());
        if count == 0 {
            return HashSet::new();
        }
        let access = self.access_counts.lock();
        // (primary, secondary, seq): higher scores first, earlier insertion on ties
        let mut ranked: Vec<(u64, u64, u32)> = (0..index.node_count)
            .filter(|&seq| !index.is_deleted(seq))
            .map(|seq| {
                let degree = index.degree(seq) as u64;
                match self.config.policy {
                    HubPolicy::Degree => (degree, 0, seq),
                    HubPolicy::AccessFrequency => {
                        let hits = access.get(index.external_id(seq)).copied().unwrap_or(0);
                        (hits, degree, seq)
                    }
                }
            })
            .collect();
        ranked.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));
        ranked
            .into_iter()
            .take(count)
            .map(|(_, _, seq)| index.external_id(seq).to_string())
            .collect()
    }

    /// Marks the hub snapshot stale; the next read recomputes it.
    pub fn invalidate(&self) {
        if let Some(snap) = self.snapshot.lock().as_mut() {
            snap.stale = true;
        }
    }

    /// Keeps `vector` resident under `id` until the next refresh decides otherwise.
    pub fn retain(&self, id: &str, vector: Arc<Vec<f32>>) {
        self.resident.write().insert(id.to_string(), vector);
    }

    pub fn resident(&self, id: &str) -> Option<Arc<Vec<f32>>> {
        self.resident.read().get(id).cloned()
    }

    pub fn resident_count(&self) -> usize {
        self.resident.read().len()
    }

    /// Resident vectors, for persistence.
    pub fn resident_entries(&self) -> Vec<(String, Vec<f32>)> {
        self.resident
            .read()
            .iter()
            .map(|(id, v)| (id.clone(), v.as_ref().clone()))
            .collect()
    }

    pub fn record_access<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        let mut counts = self.access_counts.lock();
        for id in ids {
            *counts.entry(id.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Cumulative `hits / (hits + misses)`; 0 before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Forgets everything known about `id`.
    pub fn remove(&self, id: &str) {
        self.resident.write().remove(id);
        self.access_counts.lock().remove(id);
        self.invalidate();
    }

    /// Drops residents, access history and the snapshot. Hit/miss counters are kept.
    pub fn clear(&self) {
        self.resident.write().clear();
        self.access_counts.lock().clear();
        *self.snapshot.lock() = None;
    }
}

impl std::fmt::Debug for HubCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubCache")
            .field("config", &self.config)
            .field("resident", &self.resident_count())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}
