//! Content store: original text behind each vector, bounded by bytes.
//!
//! The store is what makes non-hub vectors recomputable. It is persisted as the
//! `.content` JSON sidecar next to the vector file:
//! `{"version": 1, "entries": [[id, text], ...], "metadata": {id: {...}}}`.

use crate::backend::VectorRecompute;
use crate::cache::{CacheStats, LruCache};
use crate::config::CONTENT_FORMAT_VERSION;
use crate::document::{ContentEntry, Metadata};
use crate::embedding::DualCodeEmbeddingProvider;
use crate::error::{MemoryError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSidecar {
    pub version: u32,
    /// Least recently used first, so replaying restores recency.
    pub entries: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Metadata>,
}

impl ContentSidecar {
    /// Parses sidecar JSON. A version other than the current one is an error
    /// carrying the found version, so the caller can decide to skip it.
    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| format!("invalid JSON: {e}"))?;
        let version = value
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| "missing version field".to_string())?;
        if version != CONTENT_FORMAT_VERSION as u64 {
            return Err(format!(
                "unsupported content format version {version} (expected {CONTENT_FORMAT_VERSION})"
            ));
        }
        serde_json::from_value(value).map_err(|e| format!("malformed content sidecar: {e}"))
    }
}

pub struct ContentStore {
    cache: LruCache<String, ContentEntry>,
}

impl ContentStore {
    pub fn new(capacity_bytes: usize) -> Self {
        let cache = LruCache::with_sizer(capacity_bytes, Box::new(|e: &ContentEntry| e.byte_size()))
            .on_evict(Box::new(|id: &String, entry: &ContentEntry| {
                tracing::debug!(id = %id, bytes = entry.byte_size(), "content evicted");
            }));
        Self { cache }
    }

    /// Stores `entry`; returns `false` if it alone exceeds the store's capacity.
    pub fn put(&self, id: &str, entry: ContentEntry) -> bool {
        self.cache.set(id.to_string(), entry)
    }

    /// Lookup that refreshes recency and counts toward the store's hit ratio.
    pub fn get(&self, id: &str) -> Option<ContentEntry> {
        self.cache.get(&id.to_string())
    }

    /// Lookup without side effects.
    pub fn peek(&self, id: &str) -> Option<ContentEntry> {
        self.cache.peek(&id.to_string())
    }

    pub fn remove(&self, id: &str) -> Option<ContentEntry> {
        self.cache.remove(&id.to_string())
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn to_sidecar(&self) -> ContentSidecar {
        let mut entries = Vec::with_capacity(self.cache.len());
        let mut metadata = HashMap::new();
        for (id, entry) in self.cache.entries().into_iter().rev() {
            if !entry.metadata.is_empty() {
                metadata.insert(id.clone(), entry.metadata);
            }
            entries.push((id, entry.text));
        }
        ContentSidecar {
            version: CONTENT_FORMAT_VERSION,
            entries,
            metadata,
        }
    }

    /// Replays a sidecar, keeping only IDs accepted by `keep`. Returns the number restored.
    pub fn restore(&self, sidecar: ContentSidecar, keep: impl Fn(&str) -> bool) -> usize {
        let ContentSidecar {
            entries,
            mut metadata,
            ..
        } = sidecar;
        let mut restored = 0;
        for (id, text) in entries {
            if !keep(&id) {
                continue;
            }
            let meta = metadata.remove(&id).unwrap_or_default();
            if self.put(&id, ContentEntry::new(text, meta)) {
                restored += 1;
            }
        }
        restored
    }
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore").field("cache", &self.cache).finish()
    }
}

/// Recomputes a vector by re-embedding its stored content.
pub struct ContentRecompute {
    pub content: Arc<ContentStore>,
    pub embedder: Arc<DualCodeEmbeddingProvider>,
}

#[async_trait]
impl VectorRecompute for ContentRecompute {
    async fn recompute(&self, id: &str) -> Result<Vec<f32>> {
        let entry = self
            .content
            .get(id)
            .ok_or_else(|| MemoryError::Embedding(format!("no content stored for {id}")))?;
        let (_, vector) = self.embedder.embed_content(&entry.text).await?;
        Ok(vector)
    }
}
