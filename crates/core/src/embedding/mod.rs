//! Embedding generation: the provider contract, content classification,
//! preprocessing, and the dual query/code provider with fusion.

/// Code vs natural-language scoring.
pub mod classify;
/// Classification-routed embedding with fusion and a hash-keyed cache.
pub mod dual;
/// Deterministic feature-hashing provider.
pub mod hashing;
/// Abbreviation expansion and identifier splitting.
pub mod preprocess;

use crate::error::Result;
use async_trait::async_trait;

pub use classify::{ClassificationScores, ContentType};
pub use dual::DualCodeEmbeddingProvider;
pub use hashing::HashingEmbedder;

/// Host-supplied text embedding function.
///
/// Implementations should be deterministic enough for caching to pay off; a
/// non-deterministic provider only lowers cache hit rates.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of every vector returned by [`EmbeddingProvider::embed`].
    fn dimension(&self) -> usize;
}
