//! Hierarchical Navigable Small World (HNSW) approximate nearest neighbor index.
//!
//! Vectors are always stored using int8 scalar quantization for 4× memory reduction.
//! When `store_raw_vectors` is false (default, compact mode), all distances use
//! asymmetric f32-query-vs-i8-stored computation. When true, raw f32 vectors are
//! also kept for exact distance computation during search.
//!
//! The graph uses a Struct-of-Arrays (SoA) layout for cache-friendly access:
//! all vector codes are stored contiguously in an arena, with separate arrays for
//! quantization parameters, neighbor lists, and layer assignments.

/// HNSW deletion with neighbor repair and entry point re-election.
pub mod delete;
/// Distance metrics: cosine, euclidean, dot product and manhattan.
pub mod distance;
/// HNSW graph structure, configuration, and data storage.
pub mod graph;
/// HNSW insertion algorithm with bidirectional connections and heuristic pruning.
pub mod insert;
/// HNSW search: single-layer search, multi-layer KNN, and brute force.
pub mod search;
/// Serializable index snapshots.
pub mod snapshot;
/// Generation-based visited set for efficient graph traversal.
pub mod visited;

pub use distance::DistanceMetric;
pub use graph::{HnswConfig, HnswIndex, SearchHit};
pub use snapshot::HnswSnapshot;
