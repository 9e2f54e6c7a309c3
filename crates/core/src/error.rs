//! Error taxonomy for the vector memory core.
//!
//! Every fallible operation below the adapter returns [`MemoryError`]. The adapter
//! converts errors into a typed search status instead of letting them escape.

use std::path::PathBuf;
use std::time::Duration;

/// Coarse error classes, used by callers to decide whether a retry makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller's fault (bad dimension, bad config). Do not retry.
    Validation,
    /// A deadline expired. Safe to retry.
    Timeout,
    /// Save/load I/O failure or corrupt file.
    Storage,
    /// The embedding provider failed.
    Embedding,
}

/// Errors produced by the index, caches, embedding layer and persistence.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector id already present: {0}")]
    DuplicateId(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown distance metric: {0}")]
    UnknownMetric(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Maps the error onto the validation / timeout / storage / embedding taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MemoryError::DimensionMismatch { .. }
            | MemoryError::DuplicateId(_)
            | MemoryError::InvalidConfig(_)
            | MemoryError::InvalidInput(_)
            | MemoryError::UnknownMetric(_) => ErrorKind::Validation,
            MemoryError::Timeout(_) => ErrorKind::Timeout,
            MemoryError::NotFound(_) | MemoryError::Corrupt(_) | MemoryError::Io(_) => {
                ErrorKind::Storage
            }
            MemoryError::Embedding(_) => ErrorKind::Embedding,
        }
    }

    /// `true` for errors that are safe to retry unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let e = MemoryError::DimensionMismatch {
            expected: 4,
            actual: 3,
        };
        assert_eq!(e.kind(), ErrorKind::Validation);
        assert!(!e.is_retryable());

        let e = MemoryError::Timeout(Duration::from_millis(5));
        assert_eq!(e.kind(), ErrorKind::Timeout);
        assert!(e.is_retryable());

        let e = MemoryError::Corrupt("bad crc".into());
        assert_eq!(e.kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_display() {
        let e = MemoryError::DimensionMismatch {
            expected: 1536,
            actual: 8,
        };
        assert_eq!(e.to_string(), "dimension mismatch: expected 1536, got 8");
    }
}
