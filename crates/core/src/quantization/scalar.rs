//! Int8 scalar quantization.
//!
//! Each f32 vector is compressed to i8 by finding its min and max, then linearly
//! mapping every component onto 256 buckets. `offset` (the min) and `scale`
//! (`(max - min) / 255`) are stored per vector. Reconstruction is
//! `offset + (code + 128) * scale`, so the absolute error per component is at most
//! `scale / 2`. The range and reconstruction are computed in f64, so vectors spanning
//! most of the f32 range still yield a finite scale.
//!
//! Distance functions use SIMD-friendly chunked loops with f32 inner accumulators
//! and f64 outer accumulation to minimize rounding error.

use serde::{Deserialize, Serialize};

/// Bias between the stored i8 code and its bucket index in \[0, 255\].
const CODE_BIAS: f64 = 128.0;

/// Int8-quantized vector. Owns no reference to the original floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedVector {
    pub data: Vec<i8>,
    pub offset: f32,
    pub scale: f32,
}

/// Lightweight reference to quantized vector data. Zero allocation.
/// Used by the SoA `HnswIndex` for distance computation against its arena.
#[derive(Debug, Clone, Copy)]
pub struct VectorRef<'a> {
    pub data: &'a [i8],
    pub offset: f32,
    pub scale: f32,
}

impl VectorRef<'_> {
    /// Reconstructs component `i`.
    #[inline(always)]
    pub fn value(&self, i: usize) -> f32 {
        (self.offset as f64 + (self.data[i] as f64 + CODE_BIAS) * self.scale as f64) as f32
    }
}

impl QuantizedVector {
    /// Quantize a f32 vector using min-max scaling. The input is not modified.
    pub fn quantize(vector: &[f32]) -> Self {
        if vector.is_empty() {
            return Self {
                data: Vec::new(),
                offset: 0.0,
                scale: 0.0,
            };
        }

        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for &v in vector {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }

        let range = max as f64 - min as f64;
        if range < f32::EPSILON as f64 {
            // Constant vector: every component reconstructs exactly to `offset`.
            return Self {
                data: vec![i8::MIN; vector.len()],
                offset: min,
                scale: 0.0,
            };
        }

        let scale = (range / 255.0) as f32;
        let inv_scale = 255.0 / range;
        let data = vector
            .iter()
            .map(|&v| {
                let bucket = ((v as f64 - min as f64) * inv_scale).round().clamp(0.0, 255.0);
                (bucket - CODE_BIAS) as i8
            })
            .collect();

        Self {
            data,
            offset: min,
            scale,
        }
    }

    /// Dequantize back to f32. Lossy.
    pub fn dequantize(&self) -> Vec<f32> {
        if self.scale == 0.0 {
            return vec![self.offset; self.data.len()];
        }
        let r = self.as_ref();
        (0..self.data.len()).map(|i| r.value(i)).collect()
    }

    /// Upper bound on the per-component reconstruction error.
    pub fn max_error(&self) -> f32 {
        self.scale / 2.0
    }

    /// Returns the dimensionality of the quantized vector.
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    /// Bytes used by the codes plus the offset/scale pair.
    pub fn byte_size(&self) -> usize {
        self.data.len() + 2 * std::mem::size_of::<f32>()
    }

    /// Create a VectorRef borrowing this vector's data.
    pub fn as_ref(&self) -> VectorRef<'_> {
        VectorRef {
            data: &self.data,
            offset: self.offset,
            scale: self.scale,
        }
    }
}

/// SIMD-friendly chunk size for f32 asymmetric loops.
/// 8 × f32 = 256 bit = one AVX register.
const CHUNK_F32: usize = 8;

/// Asymmetric cosine similarity: f32 query vs i8 stored.
/// `query_norm_sq` is the precomputed sum of squares of the query.
#[allow(clippy::needless_range_loop)]
pub fn cosine_similarity_asym(query: &[f32], stored: VectorRef<'_>, query_norm_sq: f32) -> f32 {
    debug_assert_eq!(query.len(), stored.data.len());

    if query_norm_sq < 1e-20 {
        return 0.0;
    }

    let len = query.len();
    let mut dot = 0.0f64;
    let mut norm_s = 0.0f64;

    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let mut cd = 0.0f32;
        let mut cns = 0.0f32;
        for j in 0..CHUNK_F32 {
            let q = query[base + j];
            let s = stored.value(base + j);
            cd += q * s;
            cns += s * s;
        }
        dot += cd as f64;
        norm_s += cns as f64;
    }

    for i in (full_chunks * CHUNK_F32)..len {
        let q = query[i] as f64;
        let s = stored.value(i) as f64;
        dot += q * s;
        norm_s += s * s;
    }

    let denom = (query_norm_sq as f64).sqrt() * norm_s.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Asymmetric squared Euclidean distance: f32 query vs i8 stored.
#[allow(clippy::needless_range_loop)]
pub fn euclidean_distance_sq_asym(query: &[f32], stored: VectorRef<'_>) -> f32 {
    debug_assert_eq!(query.len(), stored.data.len());

    let len = query.len();
    let mut sum = 0.0f64;

    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let mut chunk_acc = 0.0f32;
        for j in 0..CHUNK_F32 {
            let diff = query[base + j] - stored.value(base + j);
            chunk_acc += diff * diff;
        }
        sum += chunk_acc as f64;
    }

    for i in (full_chunks * CHUNK_F32)..len {
        let diff = query[i] as f64 - stored.value(i) as f64;
        sum += diff * diff;
    }

    sum as f32
}

/// Asymmetric dot product: f32 query vs i8 stored.
#[allow(clippy::needless_range_loop)]
pub fn dot_product_asym(query: &[f32], stored: VectorRef<'_>) -> f32 {
    debug_assert_eq!(query.len(), stored.data.len());

    let len = query.len();
    let mut sum = 0.0f64;

    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let mut chunk_acc = 0.0f32;
        for j in 0..CHUNK_F32 {
            chunk_acc += query[base + j] * stored.value(base + j);
        }
        sum += chunk_acc as f64;
    }

    for i in (full_chunks * CHUNK_F32)..len {
        sum += query[i] as f64 * stored.value(i) as f64;
    }

    sum as f32
}

/// Asymmetric Manhattan (L1) distance: f32 query vs i8 stored.
#[allow(clippy::needless_range_loop)]
pub fn manhattan_distance_asym(query: &[f32], stored: VectorRef<'_>) -> f32 {
    debug_assert_eq!(query.len(), stored.data.len());

    let len = query.len();
    let mut sum = 0.0f64;

    let full_chunks = len / CHUNK_F32;
    for c in 0..full_chunks {
        let base = c * CHUNK_F32;
        let mut chunk_acc = 0.0f32;
        for j in 0..CHUNK_F32 {
            chunk_acc += (query[base + j] - stored.value(base + j)).abs();
        }
        sum += chunk_acc as f64;
    }

    for i in (full_chunks * CHUNK_F32)..len {
        sum += (query[i] as f64 - stored.value(i) as f64).abs();
    }

    sum as f32
}
