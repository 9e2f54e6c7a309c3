//! Deterministic feature-hashing embedder.
//!
//! Each lowercase token (and each adjacent token pair) is hashed with CRC32 into
//! one of `dimension` buckets with a sign taken from the high bit, and the result
//! is L2-normalized. No model, no network: useful for the CLI, benches and tests,
//! where only "similar text → nearby vectors" matters.

use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::hnsw::distance::l2_normalize;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(MemoryError::InvalidConfig(
                "embedding dimension must be positive".into(),
            ));
        }
        Ok(Self { dimension })
    }

    /// Synchronous embedding; the async trait method delegates here.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();
        for token in &tokens {
            self.add_feature(&mut v, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let joined = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut v, joined.as_bytes(), 0.5);
        }
        l2_normalize(&mut v);
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &[u8], weight: f32) {
        let h = crc32fast::hash(feature);
        let bucket = (h as usize) % self.dimension;
        let sign = if h & 0x8000_0000 != 0 { -1.0 } else { 1.0 };
        v[bucket] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
