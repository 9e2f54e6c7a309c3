//! Batch quantization and quality reporting.
//!
//! Callers quantize a corpus in one pass and get back memory statistics plus a
//! reconstruction-error summary, so they can decide whether the loss is acceptable.
//! [`recall_degradation`] goes one step further and measures how much brute-force
//! recall@k drops when the corpus is stored quantized.

use crate::hnsw::distance::DistanceMetric;
use crate::quantization::scalar::QuantizedVector;
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::collections::HashSet;

/// Aggregate statistics for a batch quantization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuantizationStats {
    pub count: usize,
    pub bytes_before: usize,
    pub bytes_after: usize,
    /// `bytes_before / bytes_after`, ≈4 for float32 → int8.
    pub compression_ratio: f32,
    /// Mean absolute reconstruction error over all components.
    pub mean_abs_error: f32,
    /// Largest absolute reconstruction error seen.
    pub max_abs_error: f32,
}

/// Quantizes every vector in `vectors` and reports memory and error statistics.
pub fn batch_quantize(vectors: &[Vec<f32>]) -> (Vec<QuantizedVector>, QuantizationStats) {
    let mut out = Vec::with_capacity(vectors.len());
    let mut stats = QuantizationStats {
        count: vectors.len(),
        ..Default::default()
    };
    let mut err_sum = 0.0f64;
    let mut components = 0usize;

    for v in vectors {
        let q = QuantizedVector::quantize(v);
        stats.bytes_before += std::mem::size_of_val(v.as_slice());
        stats.bytes_after += q.byte_size();
        for (orig, deq) in v.iter().zip(q.dequantize()) {
            let err = (orig - deq).abs();
            err_sum += err as f64;
            if err > stats.max_abs_error {
                stats.max_abs_error = err;
            }
        }
        components += v.len();
        out.push(q);
    }

    if stats.bytes_after > 0 {
        stats.compression_ratio = stats.bytes_before as f32 / stats.bytes_after as f32;
    }
    if components > 0 {
        stats.mean_abs_error = (err_sum / components as f64) as f32;
    }
    (out, stats)
}

/// Mean recall@k of brute-force search over the quantized corpus, using
/// full-precision brute force as ground truth. 1.0 means no degradation.
pub fn recall_degradation(
    corpus: &[Vec<f32>],
    queries: &[Vec<f32>],
    k: usize,
    metric: DistanceMetric,
) -> f32 {
    if corpus.is_empty() || queries.is_empty() || k == 0 {
        return 1.0;
    }
    let quantized: Vec<QuantizedVector> =
        corpus.iter().map(|v| QuantizedVector::quantize(v)).collect();

    let mut total = 0.0f32;
    for q in queries {
        let norm_sq: f32 = q.iter().map(|x| x * x).sum();
        let exact = top_k(corpus.len(), k, |i| metric.distance_exact(q, &corpus[i]));
        let approx = top_k(corpus.len(), k, |i| {
            metric.distance_asym(q, quantized[i].as_ref(), norm_sq)
        });
        let truth: HashSet<usize> = exact.into_iter().collect();
        let found = approx.iter().filter(|i| truth.contains(i)).count();
        total += found as f32 / truth.len() as f32;
    }
    total / queries.len() as f32
}

fn top_k(n: usize, k: usize, dist: impl Fn(usize) -> f32) -> Vec<usize> {
    let mut scored: Vec<(OrderedFloat<f32>, usize)> =
        (0..n).map(|i| (OrderedFloat(dist(i)), i)).collect();
    scored.sort_unstable();
    scored.truncate(k);
    scored.into_iter().map(|(_, i)| i).collect()
}
