//! Int8 scalar quantization for memory-efficient vector storage.
//!
//! Compresses f32 vectors to i8 using per-vector min-max scaling, achieving ≈4×
//! memory reduction. This layer is a pure storage codec: it knows nothing about the
//! graph and never mutates caller-owned vectors.

/// Int8 quantization with offset/scale calibration and asymmetric distance kernels.
pub mod scalar;
/// Batch quantization with memory and quality statistics.
pub mod stats;

pub use scalar::{QuantizedVector, VectorRef};
pub use stats::{batch_quantize, recall_degradation, QuantizationStats};
