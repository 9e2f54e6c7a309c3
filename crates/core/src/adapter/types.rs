//! Response types exposed upward by the adapter.

use crate::cache::CacheStats;
use crate::document::Metadata;
use crate::error::MemoryError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    Success,
    Timeout,
    Error,
}

/// Per-result provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub vector_id: String,
    /// The metric's natural value before normalization.
    pub original_similarity: f32,
    pub from_hub_cache: bool,
    pub recomputed: bool,
    pub degraded: bool,
    /// Backend hub-cache hit ratio at the time of the response.
    pub cache_hit_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    /// Normalized to \[0, 1\], higher is more similar.
    pub score: f32,
    pub metadata: ResultMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Metadata::is_empty")]
    pub attributes: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub status: SearchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SearchResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl SearchResponse {
    pub fn success(results: Vec<SearchResult>, elapsed: Duration) -> Self {
        Self {
            status: SearchStatus::Success,
            results: Some(results),
            error: None,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn timeout(budget: Duration, elapsed: Duration) -> Self {
        Self {
            status: SearchStatus::Timeout,
            results: None,
            error: Some(MemoryError::Timeout(budget).to_string()),
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn error(err: &MemoryError, elapsed: Duration) -> Self {
        Self {
            status: SearchStatus::Error,
            results: None,
            error: Some(err.to_string()),
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SearchStatus::Success
    }

    /// Results of a successful response, empty otherwise.
    pub fn results(&self) -> &[SearchResult] {
        self.results.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterStats {
    pub vectors: usize,
    pub dimension: usize,
    pub metric: String,
    pub hubs: usize,
    pub resident_vectors: usize,
    pub backend_hit_ratio: f64,
    pub embedding_cache: CacheStats,
    pub content_cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_json_shape() {
        let response = SearchResponse::success(
            vec![SearchResult {
                id: "a".into(),
                score: 0.9,
                metadata: ResultMetadata {
                    vector_id: "a".into(),
                    original_similarity: 0.8,
                    from_hub_cache: true,
                    recomputed: false,
                    degraded: false,
                    cache_hit_ratio: 0.5,
                },
                content: None,
                attributes: Metadata::new(),
            }],
            Duration::from_millis(12),
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["durationMs"], 12);
        assert!(json.get("error").is_none());
        let meta = &json["results"][0]["metadata"];
        assert_eq!(meta["vectorId"], "a");
        assert_eq!(meta["fromHubCache"], true);
        assert!(meta.get("cacheHitRatio").is_some());
    }

    #[test]
    fn test_timeout_and_error_shapes() {
        let t = SearchResponse::timeout(Duration::from_millis(50), Duration::from_millis(51));
        assert_eq!(t.status, SearchStatus::Timeout);
        assert!(t.results().is_empty());
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["status"], "timeout");
        assert!(json.get("results").is_none());

        let e = SearchResponse::error(&MemoryError::InvalidInput("empty".into()), Duration::ZERO);
        assert_eq!(e.status, SearchStatus::Error);
        assert!(e.error.unwrap().contains("empty"));
    }
}
