//! Distance metric implementations.
//!
//! Supports four metrics: cosine, euclidean (L2), dot product and manhattan (L1).
//! Each metric has two variants: exact f32-vs-f32 (reranking, brute force) and
//! asymmetric f32-vs-i8 against the quantized arena (graph traversal).

use crate::error::MemoryError;
use crate::quantization::scalar::{self, VectorRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distance metric used for vector similarity computation.
///
/// All `distance_*` methods return a value where **lower is better** (more similar).
/// [`DistanceMetric::raw_value`] converts that back into the metric's natural value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine distance: `1 - cosine_similarity`. Range: \[0, 2\].
    #[default]
    Cosine,
    /// Squared Euclidean distance (L2²). Range: \[0, ∞).
    Euclidean,
    /// Negative dot product: `-dot(a, b)`. Lower = higher similarity.
    #[serde(rename = "dot")]
    DotProduct,
    /// L1 distance. Range: \[0, ∞).
    Manhattan,
}

impl DistanceMetric {
    pub const ALL: [DistanceMetric; 4] = [
        DistanceMetric::Cosine,
        DistanceMetric::Euclidean,
        DistanceMetric::DotProduct,
        DistanceMetric::Manhattan,
    ];

    /// Stable name used in snapshots, config files and the CLI.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::DotProduct => "dot",
            DistanceMetric::Manhattan => "manhattan",
        }
    }

    /// `true` for metrics whose natural value is a similarity (higher = closer).
    pub fn is_similarity(&self) -> bool {
        matches!(self, DistanceMetric::Cosine | DistanceMetric::DotProduct)
    }

    /// Exact f32-vs-f32 distance. No quantization loss.
    pub fn distance_exact(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
            DistanceMetric::Euclidean => euclidean_distance_sq(a, b),
            DistanceMetric::DotProduct => -dot_product(a, b),
            DistanceMetric::Manhattan => manhattan_distance(a, b),
        }
    }

    /// Asymmetric distance: f32 query vs i8 stored, with precomputed query norm squared
    /// (only cosine reads it).
    pub fn distance_asym(&self, query: &[f32], stored: VectorRef<'_>, query_norm_sq: f32) -> f32 {
        match self {
            DistanceMetric::Cosine => {
                1.0 - scalar::cosine_similarity_asym(query, stored, query_norm_sq)
            }
            DistanceMetric::Euclidean => scalar::euclidean_distance_sq_asym(query, stored),
            DistanceMetric::DotProduct => -scalar::dot_product_asym(query, stored),
            DistanceMetric::Manhattan => scalar::manhattan_distance_asym(query, stored),
        }
    }

    /// Converts an internal distance back into the metric's natural value:
    /// similarity for cosine/dot, true (non-squared) distance for euclidean/manhattan.
    pub fn raw_value(&self, distance: f32) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - distance,
            DistanceMetric::DotProduct => -distance,
            DistanceMetric::Euclidean => distance.max(0.0).sqrt(),
            DistanceMetric::Manhattan => distance,
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "dot" | "dot_product" => Ok(DistanceMetric::DotProduct),
            "manhattan" | "l1" => Ok(DistanceMetric::Manhattan),
            other => Err(MemoryError::UnknownMetric(other.to_string())),
        }
    }
}

/// SIMD-friendly chunk size for f32 loops.
const CHUNK_F32: usize = 8;

/// Dot product between two f32 slices.
#[allow(clippy::needless_range_loop)]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let len = a.len();
    let mut sum = 0.0f64;
    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let mut acc = 0.0f32;
        for j in 0..CHUNK_F32 {
            acc += a[base + j] * b[base + j];
        }
        sum += acc as f64;
    }
    for i in (full_chunks * CHUNK_F32)..len {
        sum += a[i] as f64 * b[i] as f64;
    }
    sum as f32
}

/// Cosine similarity in \[-1, 1\]. Returns 0 when either vector has zero magnitude.
#[allow(clippy::needless_range_loop)]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let len = a.len();
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let (mut cd, mut ca, mut cb) = (0.0f32, 0.0f32, 0.0f32);
        for j in 0..CHUNK_F32 {
            let x = a[base + j];
            let y = b[base + j];
            cd += x * y;
            ca += x * x;
            cb += y * y;
        }
        dot += cd as f64;
        na += ca as f64;
        nb += cb as f64;
    }
    for i in (full_chunks * CHUNK_F32)..len {
        let x = a[i] as f64;
        let y = b[i] as f64;
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    ((dot / denom) as f32).clamp(-1.0, 1.0)
}

/// Squared Euclidean distance between two f32 slices.
#[allow(clippy::needless_range_loop)]
pub fn euclidean_distance_sq(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let len = a.len();
    let mut sum = 0.0f64;
    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let mut acc = 0.0f32;
        for j in 0..CHUNK_F32 {
            let d = a[base + j] - b[base + j];
            acc += d * d;
        }
        sum += acc as f64;
    }
    for i in (full_chunks * CHUNK_F32)..len {
        let d = a[i] as f64 - b[i] as f64;
        sum += d * d;
    }
    sum as f32
}

/// Manhattan (L1) distance between two f32 slices.
#[allow(clippy::needless_range_loop)]
pub fn manhattan_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let len = a.len();
    let mut sum = 0.0f64;
    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let mut acc = 0.0f32;
        for j in 0..CHUNK_F32 {
            acc += (a[base + j] - b[base + j]).abs();
        }
        sum += acc as f64;
    }
    for i in (full_chunks * CHUNK_F32)..len {
        sum += (a[i] as f64 - b[i] as f64).abs();
    }
    sum as f32
}

/// Scales `v` to unit L2 norm in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = dot_product(v, v).sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantization::QuantizedVector;

    #[test]
    fn test_distance_exact_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let d = DistanceMetric::Cosine.distance_exact(&a, &b);
        assert!(
            (d - 1.0).abs() < 0.001,
            "orthogonal cosine distance = 1.0, got {d}"
        );
    }

    #[test]
    fn test_cosine_zero_vector_is_neutral() {
        let a = vec![1.0, 2.0, 3.0];
        let zero = vec![0.0; 3];
        assert_eq!(cosine_similarity(&a, &zero), 0.0);
        assert_eq!(DistanceMetric::Cosine.distance_exact(&a, &zero), 1.0);
    }

    #[test]
    fn test_distance_exact_euclidean() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![3.0, 4.0, 0.0];
        let d = DistanceMetric::Euclidean.distance_exact(&a, &b);
        assert!(
            (d - 25.0).abs() < 0.001,
            "squared euclidean should be 25, got {d}"
        );
        assert!((DistanceMetric::Euclidean.raw_value(d) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_distance_exact_dot_product() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![4.0, 5.0, 6.0];
        let d = DistanceMetric::DotProduct.distance_exact(&a, &b);
        assert!(
            (d - (-32.0)).abs() < 0.001,
            "negative dot product should be -32, got {d}"
        );
        assert_eq!(DistanceMetric::DotProduct.raw_value(d), 32.0);
    }

    #[test]
    fn test_distance_exact_manhattan() {
        let a = vec![1.0, -1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let b = vec![0.0, 1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, -1.0];
        assert!((DistanceMetric::Manhattan.distance_exact(&a, &b) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_asym_accuracy_vs_exact() {
        let query = vec![0.5, -0.3, 0.8, 0.1, 0.9, -0.2, 0.6, 0.4];
        let stored_raw = vec![0.7, 0.2, -0.5, 0.3, 0.1, 0.8, -0.4, 0.6];
        let qs = QuantizedVector::quantize(&stored_raw);
        let norm_sq: f32 = query.iter().map(|x| x * x).sum();
        for metric in DistanceMetric::ALL {
            let exact = metric.distance_exact(&query, &stored_raw);
            let asym = metric.distance_asym(&query, qs.as_ref(), norm_sq);
            assert!(
                (exact - asym).abs() < 0.05,
                "{metric}: asym vs exact gap too large: exact={exact}, asym={asym}"
            );
        }
    }

    #[test]
    fn test_parse_names() {
        for metric in DistanceMetric::ALL {
            assert_eq!(metric.name().parse::<DistanceMetric>().unwrap(), metric);
        }
        assert!(matches!(
            "hamming".parse::<DistanceMetric>(),
            Err(MemoryError::UnknownMetric(_))
        ));
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 4];
        l2_normalize(&mut zero);
        assert!(zero.iter().all(|&x| x == 0.0));
    }
}
