//! `LeannSourceAdapter`: the memory-source facade.
//!
//! Wraps the backend, the dual embedding provider and the content store behind one
//! API with normalized scores, per-call timeouts, content-based indexing and
//! atomic save/load of the `(vectors, content)` file pair.

pub mod content;
pub mod score;
pub mod types;

pub use self::content::{ContentRecompute, ContentSidecar, ContentStore};
pub use self::score::normalize_score;
pub use self::types::{AdapterStats, ResultMetadata, SearchResponse, SearchResult, SearchStatus};

use crate::backend::{BackendHit, LeannBackend, Recompute};
use crate::config::{MemoryConfig, BACKUP_SUFFIX, CONTENT_SIDECAR_SUFFIX};
use crate::document::{ContentEntry, Metadata};
use crate::embedding::{DualCodeEmbeddingProvider, EmbeddingProvider};
use crate::error::{MemoryError, Result};
use crate::storage::persistence::{discard, read_optional, tmp_path, with_suffix, write_tmp};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct LeannSourceAdapter {
    config: MemoryConfig,
    backend: LeannBackend,
    embedder: Arc<DualCodeEmbeddingProvider>,
    content: Arc<ContentStore>,
}

impl LeannSourceAdapter {
    /// Builds an adapter over `provider`, whose dimension must match the config's.
    pub fn new(config: MemoryConfig, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        config.validate()?;
        if provider.dimension() != config.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: config.dimension,
                actual: provider.dimension(),
            });
        }
        let embedder = Arc::new(DualCodeEmbeddingProvider::new(
            provider,
            config.fusion.clone(),
            config.cache.embedding_entries,
        )?);
        let content = Arc::new(ContentStore::new(config.cache.content_bytes));
        let recompute = Recompute::Available(Arc::new(ContentRecompute {
            content: Arc::clone(&content),
            embedder: Arc::clone(&embedder),
        }));
        let backend = LeannBackend::new(
            config.dimension,
            config.hnsw.clone(),
            config.hub.clone(),
            recompute,
            config.search.rerank_factor,
        )?;
        info!(
            dimension = config.dimension,
            metric = %config.hnsw.distance_metric,
            hub_ratio = config.hub.ratio,
            "memory adapter ready"
        );
        Ok(Self {
            config,
            backend,
            embedder,
            content,
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn backend(&self) -> &LeannBackend {
        &self.backend
    }

    pub fn embedder(&self) -> &DualCodeEmbeddingProvider {
        &self.embedder
    }

    /// Vector search. Never fails: errors and timeouts are reported in the response.
    pub async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        timeout: Option<Duration>,
    ) -> SearchResponse {
        let started = Instant::now();
        let budget = timeout.unwrap_or_else(|| self.config.search.default_timeout());
        self.search_within(vector, top_k, budget, budget, started).await
    }

    /// Embeds `query` with classification, then searches. Embedding may use at most
    /// half of the budget; the search gets whatever remains.
    pub async fn search_by_text(
        &self,
        query: &str,
        top_k: usize,
        timeout: Option<Duration>,
    ) -> SearchResponse {
        let started = Instant::now();
        let budget = timeout.unwrap_or_else(|| self.config.search.default_timeout());
        if query.trim().is_empty() {
            let err = MemoryError::InvalidInput("query text is empty".into());
            return SearchResponse::error(&err, started.elapsed());
        }
        let embedding = tokio::time::timeout(budget / 2, self.embedder.embed_content(query));
        let vector = match embedding.await {
            Ok(Ok((kind, vector))) => {
                debug!(kind = %kind, "query embedded");
                vector
            }
            Ok(Err(e)) => return SearchResponse::error(&e, started.elapsed()),
            Err(_) => {
                warn!(budget_ms = budget.as_millis() as u64, "query embedding timed out");
                return SearchResponse::timeout(budget, started.elapsed());
            }
        };
        let remaining = budget.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return SearchResponse::timeout(budget, started.elapsed());
        }
        self.search_within(&vector, top_k, remaining, budget, started)
            .await
    }

    async fn search_within(
        &self,
        vector: &[f32],
        top_k: usize,
        remaining: Duration,
        budget: Duration,
        started: Instant,
    ) -> SearchResponse {
        match tokio::time::timeout(remaining, self.backend.search(vector, top_k, false)).await {
            Ok(Ok(hits)) => {
                let results = self.to_results(hits);
                debug!(
                    results = results.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "search complete"
                );
                SearchResponse::success(results, started.elapsed())
            }
            Ok(Err(e)) => {
                debug!(
                    error = %e,
                    kind = ?e.kind(),
                    retryable = e.is_retryable(),
                    "search failed"
                );
                SearchResponse::error(&e, started.elapsed())
            }
            Err(_) => {
                warn!(budget_ms = budget.as_millis() as u64, "search timed out");
                SearchResponse::timeout(budget, started.elapsed())
            }
        }
    }

    fn to_results(&self, hits: Vec<BackendHit>) -> Vec<SearchResult> {
        let metric = self.backend.metric();
        let cache_hit_ratio = self.backend.cache_hit_ratio();
        hits.into_iter()
            .map(|hit| {
                let (content, attributes) = match self.content.peek(&hit.id) {
                    Some(entry) => (Some(entry.text), entry.metadata),
                    None => (None, Metadata::new()),
                };
                SearchResult {
                    score: normalize_score(metric, hit.raw_value),
                    metadata: ResultMetadata {
                        vector_id: hit.id.clone(),
                        original_similarity: hit.raw_value,
                        from_hub_cache: hit.from_hub_cache,
                        recomputed: hit.recomputed,
                        degraded: hit.degraded,
                        cache_hit_ratio,
                    },
                    id: hit.id,
                    content,
                    attributes,
                }
            })
            .collect()
    }

    /// Embeds and stores `content` under a fresh unique ID, which is returned.
    pub async fn index(&self, content: &str, metadata: Metadata) -> Result<String> {
        if content.trim().is_empty() {
            return Err(MemoryError::InvalidInput("content is empty".into()));
        }
        let (kind, vector) = self.embedder.embed_content(content).await?;
        let id = uuid::Uuid::new_v4().to_string();
        let entry = ContentEntry::new(content, metadata);
        if !self.content.put(&id, entry) {
            warn!(
                id = %id,
                bytes = content.len(),
                "content larger than the content store; it will not be recomputable"
            );
        }
        if let Err(e) = self.backend.insert(id.clone(), vector) {
            self.content.remove(&id);
            return Err(e);
        }
        debug!(id = %id, kind = %kind, "content indexed");
        Ok(id)
    }

    pub fn delete(&self, id: &str) -> bool {
        let removed = self.backend.delete(id);
        self.content.remove(id);
        removed
    }

    pub fn count(&self) -> usize {
        self.backend.count()
    }

    pub fn hub_ids(&self) -> Vec<String> {
        self.backend.hub_ids()
    }

    pub fn content(&self, id: &str) -> Option<ContentEntry> {
        self.content.peek(id)
    }

    pub fn stats(&self) -> AdapterStats {
        let backend = self.backend.stats();
        AdapterStats {
            vectors: backend.count,
            dimension: self.backend.dimension(),
            metric: self.backend.metric().to_string(),
            hubs: backend.hubs,
            resident_vectors: backend.resident,
            backend_hit_ratio: backend.hit_ratio,
            embedding_cache: self.embedder.cache_stats(),
            content_cache: self.content.stats(),
        }
    }

    /// Persists vectors to `path` and content to `<path>.content`.
    ///
    /// Both files are written to temp siblings first and only renamed into place
    /// once both writes succeeded; on failure the temps are removed and any
    /// previously saved pair is left untouched.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let index_bytes = self.backend.encode()?;
        let sidecar = self.content.to_sidecar();
        let entries = sidecar.entries.len();
        let sidecar_bytes =
            serde_json::to_vec(&sidecar).map_err(|e| MemoryError::Corrupt(e.to_string()))?;

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_pair(&target, &index_bytes, &sidecar_bytes))
            .await
            .map_err(|e| MemoryError::Io(std::io::Error::other(e)))??;
        info!(path = ?path, vectors = self.count(), content = entries, "memory saved");
        Ok(())
    }

    /// Loads a pair written by [`LeannSourceAdapter::save`], replacing in-memory state.
    /// Returns `false` if no vector file exists at `path`.
    ///
    /// A corrupt vector file is an error. A missing, corrupt or unsupported content
    /// sidecar is logged and skipped.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref().to_path_buf();
        let target = path.clone();
        let (index_bytes, content_bytes) = tokio::task::spawn_blocking(move || read_pair(&target))
            .await
            .map_err(|e| MemoryError::Io(std::io::Error::other(e)))??;
        let Some(index_bytes) = index_bytes else {
            debug!(path = ?path, "no saved memory");
            return Ok(false);
        };

        self.backend.restore(&index_bytes, &path)?;
        self.content.clear();
        let restored = match content_bytes {
            None => {
                warn!(path = ?path, "content sidecar missing; vectors loaded without content");
                0
            }
            Some(bytes) => match ContentSidecar::parse(&bytes) {
                Ok(sidecar) => self.content.restore(sidecar, |id| self.backend.contains(id)),
                Err(reason) => {
                    warn!(path = ?path, %reason, "skipping content sidecar");
                    0
                }
            },
        };
        info!(path = ?path, vectors = self.count(), content = restored, "memory loaded");
        Ok(true)
    }
}

impl std::fmt::Debug for LeannSourceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeannSourceAdapter")
            .field("dimension", &self.config.dimension)
            .field("backend", &self.backend)
            .field("content", &self.content)
            .finish()
    }
}

fn content_path(path: &Path) -> PathBuf {
    with_suffix(path, CONTENT_SIDECAR_SUFFIX)
}

fn write_pair(path: &Path, index_bytes: &[u8], sidecar_bytes: &[u8]) -> Result<()> {
    let sidecar_path = content_path(path);
    let backup = with_suffix(path, BACKUP_SUFFIX);
    let result = commit_pair(path, &sidecar_path, &backup, index_bytes, sidecar_bytes);
    if let Err(e) = &result {
        warn!(path = ?path, error = %e, "save failed; discarding temp files");
        discard(&tmp_path(path));
        discard(&tmp_path(&sidecar_path));
    }
    discard(&backup);
    result
}

/// Writes both temps, then renames them into place. If the sidecar rename fails
/// the vector file is rolled back to the committed copy held at `backup`.
fn commit_pair(
    path: &Path,
    sidecar_path: &Path,
    backup: &Path,
    index_bytes: &[u8],
    sidecar_bytes: &[u8],
) -> Result<()> {
    write_tmp(path, index_bytes)?;
    write_tmp(sidecar_path, sidecar_bytes)?;
    let had_previous = preserve(path, backup)?;
    fs::rename(tmp_path(path), path)?;
    if let Err(e) = fs::rename(tmp_path(sidecar_path), sidecar_path) {
        let rollback = if had_previous {
            fs::rename(backup, path)
        } else {
            fs::remove_file(path)
        };
        if let Err(rollback_err) = rollback {
            warn!(path = ?path, error = %rollback_err, "could not roll back vector file");
        }
        return Err(e.into());
    }
    Ok(())
}

/// Keeps the committed vector file reachable at `backup` while it is replaced.
/// Returns `false` when nothing has been committed yet.
fn preserve(path: &Path, backup: &Path) -> Result<bool> {
    discard(backup);
    match fs::hard_link(path, backup) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(_) => {
            fs::copy(path, backup)?;
            Ok(true)
        }
    }
}

fn read_pair(path: &Path) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>)> {
    let Some(index_bytes) = read_optional(path)? else {
        return Ok((None, None));
    };
    let content_bytes = match read_optional(&content_path(path)) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = ?path, error = %e, "content sidecar unreadable");
            None
        }
    };
    Ok((Some(index_bytes), content_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubPolicy;
    use crate::embedding::HashingEmbedder;
    use crate::hnsw::DistanceMetric;

    fn adapter(dimension: usize) -> LeannSourceAdapter {
        let mut config = MemoryConfig::with_dimension(dimension);
        config.hub.ratio = 0.5;
        config.hub.policy = HubPolicy::Degree;
        let provider = Arc::new(HashingEmbedder::new(dimension).unwrap());
        LeannSourceAdapter::new(config, provider).unwrap()
    }

    #[test]
    fn test_provider_dimension_must_match() {
        let config = MemoryConfig::with_dimension(64);
        let provider = Arc::new(HashingEmbedder::new(32).unwrap());
        let err = LeannSourceAdapter::new(config, provider).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::DimensionMismatch {
                expected: 64,
                actual: 32
            }
        ));
    }

    #[tokio::test]
    async fn test_index_then_search_by_text() {
        let a = adapter(128);
        let mut meta = Metadata::new();
        meta.insert("source".into(), "notes".into());
        let target = a
            .index("the quarterly budget review meeting is on thursday", meta)
            .await
            .unwrap();
        a.index("fn parse_header(buf: &[u8]) -> Result<Header, Error> { todo!() }", Metadata::new())
            .await
            .unwrap();
        a.index("grocery list: apples, bread, coffee beans", Metadata::new())
            .await
            .unwrap();
        assert_eq!(a.count(), 3);

        let response = a
            .search_by_text("when is the quarterly budget review meeting", 2, None)
            .await;
        assert!(response.is_success(), "{response:?}");
        let results = response.results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, target);
        assert_eq!(results[0].metadata.vector_id, target);
        assert!(results[0].content.as_deref().unwrap().contains("budget"));
        assert!(results[0].attributes.contains_key("source"));
        assert!(results[0].score >= results[1].score);
        for r in results {
            assert!((0.0..=1.0).contains(&r.score));
            assert!(!r.metadata.degraded);
        }
    }

    #[tokio::test]
    async fn test_index_rejects_empty_content() {
        let a = adapter(32);
        let err = a.index("   \n", Metadata::new()).await.unwrap_err();
        assert!(matches!(err, MemoryError::InvalidInput(_)));
        assert_eq!(a.count(), 0);
    }

    #[tokio::test]
    async fn test_search_reports_errors_in_response() {
        let a = adapter(32);
        a.index("something to find", Metadata::new()).await.unwrap();
        let response = a.search(&[0.5; 8], 3, None).await;
        assert_eq!(response.status, SearchStatus::Error);
        assert!(response.error.unwrap().contains("dimension"));

        let empty = a.search_by_text("  ", 3, None).await;
        assert_eq!(empty.status, SearchStatus::Error);
    }

    #[tokio::test]
    async fn test_search_empty_store() {
        let a = adapter(32);
        let response = a.search(&[0.1; 32], 5, None).await;
        assert!(response.is_success());
        assert!(response.results().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_vector_and_content() {
        let a = adapter(64);
        let id = a.index("ephemeral note", Metadata::new()).await.unwrap();
        assert!(a.content(&id).is_some());
        assert!(a.delete(&id));
        assert!(!a.delete(&id));
        assert!(a.content(&id).is_none());
        assert_eq!(a.count(), 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let a = adapter(64);
        for text in ["alpha beta", "gamma delta", "epsilon zeta", "eta theta"] {
            a.index(text, Metadata::new()).await.unwrap();
        }
        let stats = a.stats();
        assert_eq!(stats.vectors, 4);
        assert_eq!(stats.dimension, 64);
        assert_eq!(stats.metric, DistanceMetric::Cosine.to_string());
        assert_eq!(stats.hubs, 2);
        assert_eq!(stats.content_cache.size, 4);
        assert_eq!(a.hub_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.leann");
        let a = adapter(64);
        let mut ids = Vec::new();
        for text in ["first memory", "second memory", "third memory"] {
            ids.push(a.index(text, Metadata::new()).await.unwrap());
        }
        a.save(&path).await.unwrap();
        assert!(path.exists());
        assert!(content_path(&path).exists());
        assert!(!tmp_path(&path).exists());

        let b = adapter(64);
        assert!(b.load(&path).await.unwrap());
        assert_eq!(b.count(), 3);
        for id in &ids {
            assert!(b.content(id).is_some());
        }
        assert!(!b.load(dir.path().join("missing")).await.unwrap());
    }
}
