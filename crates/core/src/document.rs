//! Content-store record types.
//!
//! A `ContentEntry` is the original text behind an indexed vector plus the caller's
//! metadata. The text is what the backend re-embeds when a non-hub vector has to be
//! rehydrated; the metadata rides along to search results and the `.content` sidecar.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A typed metadata value attached to indexed content.
///
/// Untagged so the sidecar JSON stays plain (`{"lang": "rust", "lines": 42}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Boolean(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Integer(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::String(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::String(v)
    }
}

pub type Metadata = HashMap<String, MetadataValue>;

/// Original text and metadata for one vector ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub text: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: Metadata,
}

impl ContentEntry {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// Bytes charged against the content store's capacity.
    pub fn byte_size(&self) -> usize {
        self.text.len()
            + self
                .metadata
                .iter()
                .map(|(k, v)| {
                    k.len()
                        + match v {
                            MetadataValue::String(s) => s.len(),
                            _ => 8,
                        }
                })
                .sum::<usize>()
    }
}
