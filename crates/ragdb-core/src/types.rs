//! Domain types shared by the lexical, vector and hybrid engines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::hashing::content_id;

/// 63-bit content-addressed point identifier. See [`crate::hashing::content_id`].
pub type ContentId = u64;

/// Reserved payload key holding the chunk text.
pub const CONTENT_KEY: &str = "content";

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaScalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// A metadata value: a scalar or a flat array of scalars. Nested objects are
/// rejected when metadata is deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Scalar(MetaScalar),
    List(Vec<MetaScalar>),
}

impl MetaValue {
    pub fn text(s: impl Into<String>) -> Self {
        MetaValue::Scalar(MetaScalar::Text(s.into()))
    }

    pub fn texts<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MetaValue::List(items.into_iter().map(|s| MetaScalar::Text(s.into())).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Scalar(MetaScalar::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// True when this value is a text equal to `needle`, or a list holding such a text.
    pub fn contains_text(&self, needle: &str) -> bool {
        match self {
            MetaValue::Scalar(MetaScalar::Text(s)) => s == needle,
            MetaValue::List(items) => items.iter().any(|i| matches!(i, MetaScalar::Text(s) if s == needle)),
            MetaValue::Scalar(_) => false,
        }
    }

    /// Equality for scalars; membership for lists.
    pub fn matches(&self, expected: &MetaScalar) -> bool {
        match self {
            MetaValue::Scalar(s) => s == expected,
            MetaValue::List(items) => items.contains(expected),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::text(s)
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::text(s)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Scalar(MetaScalar::Int(v))
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Scalar(MetaScalar::Bool(v))
    }
}

impl From<&str> for MetaScalar {
    fn from(s: &str) -> Self {
        MetaScalar::Text(s.to_string())
    }
}

impl From<String> for MetaScalar {
    fn from(s: String) -> Self {
        MetaScalar::Text(s)
    }
}

impl From<i64> for MetaScalar {
    fn from(v: i64) -> Self {
        MetaScalar::Int(v)
    }
}

impl From<bool> for MetaScalar {
    fn from(v: bool) -> Self {
        MetaScalar::Bool(v)
    }
}

/// Opaque chunk metadata. Ordered so serialized payloads are stable.
pub type Metadata = BTreeMap<String, MetaValue>;

/// Validate and convert an arbitrary JSON object into [`Metadata`].
pub fn metadata_from_json(value: serde_json::Value) -> Result<Metadata> {
    serde_json::from_value(value).map_err(|e| Error::Validation(format!("unsupported metadata shape: {e}")))
}

/// A unit of text produced by an upstream chunker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), metadata: Metadata::new() }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A point as written to the vector backend.
///
/// The backend payload is `metadata ∪ {content}`; a metadata entry named
/// `content` is dropped so the chunk text always wins.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPoint {
    pub id: ContentId,
    pub vector: Vec<f32>,
    pub content: String,
    pub metadata: Metadata,
}

impl IndexedPoint {
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        let mut metadata = chunk.metadata.clone();
        metadata.remove(CONTENT_KEY);
        Self { id: content_id(&chunk.content), vector, content: chunk.content.clone(), metadata }
    }

    pub fn payload(&self) -> Metadata {
        let mut payload = self.metadata.clone();
        payload.insert(CONTENT_KEY.to_string(), MetaValue::text(self.content.clone()));
        payload
    }
}

/// Similarity metric of a collection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Distance {
    Cosine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub dim: usize,
    pub points: usize,
}

/// A nearest-neighbour hit. `score` is cosine similarity in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: ContentId,
    pub score: f32,
    pub content: String,
    pub metadata: Metadata,
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Text,
}

/// A fused result as returned to callers.
///
/// `combined_score` is always `vector_score + bm25_score`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridHit {
    pub content: String,
    pub metadata: Metadata,
    pub vector_score: f32,
    pub bm25_score: f32,
    pub combined_score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_accepts_scalars_and_flat_arrays() {
        let meta = metadata_from_json(serde_json::json!({
            "doc_type": "research_paper",
            "page": 3,
            "score": 0.5,
            "draft": false,
            "semantic_tags": ["finding", "results"],
            "author": null,
        }))
        .expect("valid metadata");
        assert_eq!(meta["doc_type"].as_str(), Some("research_paper"));
        assert!(meta["semantic_tags"].contains_text("results"));
        assert!(meta["page"].matches(&MetaScalar::Int(3)));
        assert_eq!(meta["author"], MetaValue::Scalar(MetaScalar::Null));
    }

    #[test]
    fn metadata_rejects_nested_objects() {
        let err = metadata_from_json(serde_json::json!({ "nested": { "a": 1 } })).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn chunk_text_wins_over_content_metadata() {
        let chunk = Chunk::new("real text").with_meta("content", "spoofed");
        let point = IndexedPoint::from_chunk(&chunk, vec![1.0]);
        assert!(!point.metadata.contains_key(CONTENT_KEY));
        assert_eq!(point.payload()[CONTENT_KEY].as_str(), Some("real text"));
        assert_eq!(point.id, content_id("real text"));
    }
}
