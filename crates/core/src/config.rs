//! Configuration for the vector memory core.
//!
//! Tuning defaults and hard limits are compile-time constants. Runtime configuration is
//! a [`MemoryConfig`] tree that can be loaded from JSON; every field has a default, so a
//! partial file only overrides what it names.

use crate::error::{MemoryError, Result};
use crate::hnsw::graph::HnswConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default embedding dimension.
pub const DEFAULT_DIMENSION: usize = 1536;

/// Maximum allowed embedding dimension.
pub const MAX_DIMENSION: usize = 8192;

/// Default number of bidirectional links per HNSW node.
///
/// Higher values improve recall but increase memory and build time.
/// Typical range: 8–64. Default: 16.
pub const HNSW_DEFAULT_M: usize = 16;

/// Default ef parameter during HNSW index construction.
pub const HNSW_DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Default ef parameter during HNSW search.
///
/// Controls the size of the dynamic candidate list during query.
/// Higher values improve recall at the cost of latency.
pub const HNSW_DEFAULT_EF_SEARCH: usize = 50;

/// Maximum number of layers in the HNSW graph.
pub const HNSW_DEFAULT_MAX_LAYERS: usize = 16;

/// Fraction of tombstoned slots above which the backend rebuilds the index arena.
pub const AUTO_COMPACT_RATIO: f32 = 0.2;

/// Fraction of live nodes whose full-precision vectors stay resident.
pub const DEFAULT_HUB_RATIO: f32 = 0.1;

/// Maximum age of a hub-membership snapshot before it is recomputed.
pub const DEFAULT_HUB_REFRESH_MS: u64 = 30_000;

/// Candidates reranked at full precision per requested result.
pub const DEFAULT_RERANK_FACTOR: usize = 2;

/// Classifier threshold: a score at or above it claims the bucket.
pub const DEFAULT_CLASSIFY_THRESHOLD: f32 = 0.6;

/// Weight of the natural-language embedding in a fused embedding.
pub const DEFAULT_NLP_WEIGHT: f32 = 0.4;

/// Weight of the code embedding in a fused embedding.
pub const DEFAULT_CODE_WEIGHT: f32 = 0.6;

/// Entries kept in the embedding cache.
pub const DEFAULT_EMBEDDING_CACHE_ENTRIES: usize = 10_000;

/// Bytes of original text kept in the content store.
pub const DEFAULT_CONTENT_CACHE_BYTES: usize = 64 * 1024 * 1024;

/// Default per-request search budget.
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 5_000;

/// Version written into the `.content` sidecar.
pub const CONTENT_FORMAT_VERSION: u32 = 1;

/// Version written into the vector/graph snapshot.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Leading bytes of a saved vector/graph file.
pub const SNAPSHOT_MAGIC: &[u8; 8] = b"LEANNIDX";

/// Suffix appended to the vector file path to name its content sidecar.
pub const CONTENT_SIDECAR_SUFFIX: &str = ".content";

/// Suffix of the copy that keeps the committed vector file reachable during a save.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Hub-selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubPolicy {
    /// Nodes with the most graph edges are hubs.
    #[default]
    Degree,
    /// Nodes returned most often by searches are hubs.
    AccessFrequency,
}

/// Hub cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub ratio: f32,
    pub policy: HubPolicy,
    /// Poll interval: a snapshot older than this is recomputed on next read.
    pub refresh_interval_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            ratio: DEFAULT_HUB_RATIO,
            policy: HubPolicy::Degree,
            refresh_interval_ms: DEFAULT_HUB_REFRESH_MS,
        }
    }
}

impl HubConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

/// Content classification and embedding fusion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub threshold: f32,
    pub nlp_weight: f32,
    pub code_weight: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CLASSIFY_THRESHOLD,
            nlp_weight: DEFAULT_NLP_WEIGHT,
            code_weight: DEFAULT_CODE_WEIGHT,
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(MemoryError::InvalidConfig(format!(
                "classify threshold {} outside [0, 1]",
                self.threshold
            )));
        }
        if self.nlp_weight < 0.0 || self.code_weight < 0.0 {
            return Err(MemoryError::InvalidConfig(
                "fusion weights must be non-negative".into(),
            ));
        }
        if (self.nlp_weight + self.code_weight - 1.0).abs() > 1e-4 {
            return Err(MemoryError::InvalidConfig(format!(
                "fusion weights must sum to 1 (nlp={}, code={})",
                self.nlp_weight, self.code_weight
            )));
        }
        Ok(())
    }
}

/// Capacities of the two LRU caches owned by the adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub embedding_entries: usize,
    pub content_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            embedding_entries: DEFAULT_EMBEDDING_CACHE_ENTRIES,
            content_bytes: DEFAULT_CONTENT_CACHE_BYTES,
        }
    }
}

/// Search-time settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_timeout_ms: u64,
    pub rerank_factor: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_SEARCH_TIMEOUT_MS,
            rerank_factor: DEFAULT_RERANK_FACTOR,
        }
    }
}

impl SearchConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub dimension: usize,
    pub hnsw: HnswConfig,
    pub hub: HubConfig,
    pub fusion: FusionConfig,
    pub cache: CacheConfig,
    pub search: SearchConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            hnsw: HnswConfig::default(),
            hub: HubConfig::default(),
            fusion: FusionConfig::default(),
            cache: CacheConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl MemoryConfig {
    /// Default configuration with a different dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MemoryError::NotFound(path.to_path_buf()),
            _ => MemoryError::Io(e),
        })?;
        let config: MemoryConfig = serde_json::from_str(&raw)
            .map_err(|e| MemoryError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the index or caches cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 || self.dimension > MAX_DIMENSION {
            return Err(MemoryError::InvalidConfig(format!(
                "dimension must be in 1..={}, got {}",
                MAX_DIMENSION, self.dimension
            )));
        }
        self.hnsw.validate()?;
        if !(0.0..=1.0).contains(&self.hub.ratio) {
            return Err(MemoryError::InvalidConfig(format!(
                "hub ratio {} outside [0, 1]",
                self.hub.ratio
            )));
        }
        self.fusion.validate()?;
        if self.cache.embedding_entries == 0 || self.cache.content_bytes == 0 {
            return Err(MemoryError::InvalidConfig(
                "cache capacities must be non-zero".into(),
            ));
        }
        if self.search.rerank_factor == 0 {
            return Err(MemoryError::InvalidConfig(
                "rerank_factor must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
