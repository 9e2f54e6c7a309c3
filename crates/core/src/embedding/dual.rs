//! Dual query/code embedding with classification routing and fusion.
//!
//! Every call classifies its input, preprocesses it for the chosen route and
//! delegates to one underlying [`EmbeddingProvider`]. Mixed content is embedded
//! both ways and fused: `nlp_weight * query + code_weight * code`, L2-normalized.
//!
//! Results are cached under a SHA-256 of `(mode, content)`. Two concurrent calls
//! for the same key may both miss, both compute, and both write; the last write
//! wins. That costs a duplicate provider call but never corrupts the cache.

use crate::cache::{CacheStats, LruCache};
use crate::config::FusionConfig;
use crate::embedding::classify::{self, ClassificationScores, ContentType};
use crate::embedding::preprocess::{preprocess_code, preprocess_query};
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::hnsw::distance::l2_normalize;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

type CacheKey = [u8; 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmbedMode {
    Query,
    Code,
}

impl EmbedMode {
    fn tag(self) -> &'static [u8] {
        match self {
            EmbedMode::Query => b"query",
            EmbedMode::Code => b"code",
        }
    }
}

fn cache_key(mode: EmbedMode, content: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(mode.tag());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hasher.finalize().into()
}

pub struct DualCodeEmbeddingProvider {
    provider: Arc<dyn EmbeddingProvider>,
    fusion: FusionConfig,
    cache: LruCache<CacheKey, Arc<Vec<f32>>>,
}

impl DualCodeEmbeddingProvider {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        fusion: FusionConfig,
        cache_entries: usize,
    ) -> Result<Self> {
        fusion.validate()?;
        if cache_entries == 0 {
            return Err(MemoryError::InvalidConfig(
                "embedding cache must hold at least one entry".into(),
            ));
        }
        Ok(Self {
            provider,
            fusion,
            cache: LruCache::new(cache_entries),
        })
    }

    pub fn fusion(&self) -> &FusionConfig {
        &self.fusion
    }

    pub fn classify(&self, content: &str) -> ContentType {
        classify::classify(content, self.fusion.threshold)
    }

    pub fn scores(&self, content: &str) -> ClassificationScores {
        classify::scores(content)
    }

    /// Query-route embedding: abbreviations expanded.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_mode(EmbedMode::Query, text).await
    }

    /// Code-route embedding: identifiers split into words.
    pub async fn embed_code(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_mode(EmbedMode::Code, text).await
    }

    /// Weighted fusion of both routes, normalized to unit length.
    /// A zero-magnitude sum is returned as is.
    pub async fn embed_fused(&self, text: &str) -> Result<Vec<f32>> {
        let (query, code) = tokio::try_join!(self.embed_query(text), self.embed_code(text))?;
        let mut fused: Vec<f32> = query
            .iter()
            .zip(&code)
            .map(|(q, c)| self.fusion.nlp_weight * q + self.fusion.code_weight * c)
            .collect();
        l2_normalize(&mut fused);
        Ok(fused)
    }

    /// Classifies `content` and embeds it along the matching route.
    pub async fn embed_content(&self, content: &str) -> Result<(ContentType, Vec<f32>)> {
        let kind = self.classify(content);
        let vector = match kind {
            ContentType::Code => self.embed_code(content).await?,
            ContentType::NaturalLanguage => self.embed_query(content).await?,
            ContentType::Mixed => self.embed_fused(content).await?,
        };
        tracing::trace!(kind = %kind, len = content.len(), "content embedded");
        Ok((kind, vector))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    async fn embed_mode(&self, mode: EmbedMode, text: &str) -> Result<Vec<f32>> {
        let key = cache_key(mode, text);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.as_ref().clone());
        }
        let prepared = match mode {
            EmbedMode::Query => preprocess_query(text),
            EmbedMode::Code => preprocess_code(text),
        };
        let vector = self.provider.embed(&prepared).await?;
        let expected = self.provider.dimension();
        if vector.len() != expected {
            return Err(MemoryError::Embedding(format!(
                "provider returned {} components, expected {expected}",
                vector.len()
            )));
        }
        self.cache.set(key, Arc::new(vector.clone()));
        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for DualCodeEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_content(text).await?.1)
    }

    fn dimension(&self) -> usize {
        self.provider.dimension()
    }
}

impl std::fmt::Debug for DualCodeEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualCodeEmbeddingProvider")
            .field("fusion", &self.fusion)
            .field("dimension", &self.provider.dimension())
            .field("cache", &self.cache)
            .finish()
    }
}
