//! The unit of text that flows through ingestion, chunking and retrieval.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Metadata attached to a document, keyed by field name.
///
/// A `BTreeMap` keeps key order stable, which makes persisted metadata and
/// CLI output deterministic.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Metadata key naming where a document came from (file path, CSV path, URL).
pub const SOURCE_KEY: &str = "source";

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// A piece of text together with its metadata.
///
/// Chunks are documents too: the chunker copies the parent's metadata and
/// adds `chunk_index` and `start_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    /// Create a document with empty metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// use vecdb::Document;
    ///
    /// let doc = Document::new("hello").with_metadata("source", "greeting.txt");
    /// assert_eq!(doc.content, "hello");
    /// assert_eq!(doc.source(), Some("greeting.txt"));
    /// ```
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The `source` metadata value, when it is a string.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(MetadataValue::as_str)
    }
}

/// A document returned by a retriever together with its relevance score.
///
/// Scores are only comparable within one result list: cosine similarity for
/// vector retrieval, BM25 for lexical retrieval, fused reciprocal rank for
/// hybrid retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub metadata: Metadata,
    pub score: f32,
}

impl RetrievedDocument {
    pub fn from_document(document: &Document, score: f32) -> Self {
        Self {
            content: document.content.clone(),
            metadata: document.metadata.clone(),
            score,
        }
    }

    pub fn into_pair(self) -> (String, Metadata) {
        (self.content, self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_serializes_as_plain_scalars() {
        let doc = Document::new("body")
            .with_metadata("row", 3usize)
            .with_metadata("source", "a.csv")
            .with_metadata("verified", true);

        let json = serde_json::to_string(&doc).unwrap();
        assert_eq!(
            json,
            r#"{"content":"body","metadata":{"row":3,"source":"a.csv","verified":true}}"#
        );

        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn missing_metadata_defaults_to_empty() {
        let doc: Document = serde_json::from_str(r#"{"content":"x"}"#).unwrap();
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.source(), None);
    }

    #[test]
    fn display_renders_raw_values() {
        assert_eq!(MetadataValue::from("abc").to_string(), "abc");
        assert_eq!(MetadataValue::from(42i64).to_string(), "42");
        assert_eq!(MetadataValue::Null.to_string(), "null");
    }
}
