//! # leann-core
//!
//! Embeddable vector memory with LEANN-style storage: an HNSW graph over Int8
//! codes, a small hub cache of full-precision vectors, and on-demand recomputation
//! of every other vector from its original content.
//!
//! Content is classified as code, natural language or mixed and embedded along the
//! matching route, with weighted fusion for mixed input. The
//! [`LeannSourceAdapter`] ties everything together behind normalized scores,
//! per-call timeouts and atomic save/load.

/// Memory-source facade: normalized scores, timeouts, content indexing, save/load.
pub mod adapter;
/// LEANN backend: hub cache plus recompute-on-demand reranking.
pub mod backend;
/// Byte-bounded LRU cache and the hub-vector cache.
pub mod cache;
/// Configuration constants, defaults and the JSON-loadable runtime config.
pub mod config;
/// Content-store records: `ContentEntry` and `MetadataValue`.
pub mod document;
/// Embedding providers: classification, dual-route embedding and fusion.
pub mod embedding;
/// Error type shared by every layer.
pub mod error;
/// HNSW approximate nearest neighbor index: graph, insertion, search, deletion and snapshots.
pub mod hnsw;
/// Int8 scalar quantization with per-vector offset and scale.
pub mod quantization;
/// File framing and atomic writes.
pub mod storage;

pub use adapter::{LeannSourceAdapter, SearchResponse, SearchResult, SearchStatus};
pub use backend::{LeannBackend, Recompute, VectorRecompute};
pub use config::MemoryConfig;
pub use embedding::{DualCodeEmbeddingProvider, EmbeddingProvider, HashingEmbedder};
pub use error::{MemoryError, Result};
pub use hnsw::{DistanceMetric, HnswConfig, HnswIndex};
