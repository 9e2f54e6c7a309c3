//! Metric-independent score normalization.
//!
//! Every score lands in \[0, 1\] with higher meaning more similar, whatever the metric:
//! similarities in \[-1, 1\] map linearly, distances map through `exp(-d)`.

use crate::hnsw::DistanceMetric;

/// Normalizes a metric's natural value (see [`DistanceMetric::raw_value`]).
/// Non-finite input scores 0, except an infinite similarity, which saturates.
pub fn normalize_score(metric: DistanceMetric, raw_value: f32) -> f32 {
    if raw_value.is_nan() {
        return 0.0;
    }
    match metric {
        DistanceMetric::Cosine | DistanceMetric::DotProduct => {
            (raw_value.clamp(-1.0, 1.0) + 1.0) / 2.0
        }
        DistanceMetric::Euclidean | DistanceMetric::Manhattan => (-raw_value.max(0.0)).exp(),
    }
}
