//! Core data models that flow through the ingestion and retrieval pipelines.
//!
//! [`SourceUnit`] and [`Chunk`] are immutable once created. Store identity and
//! similarity are retrieval-time annotations and live on [`RetrievedMatch`],
//! never on the chunk itself.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fixed-length embedding vector. The length is a system-wide constant set
/// by the embedding model and the vector store schema.
pub type EmbeddingVector = Vec<f32>;

/// Metadata attached to source units and chunks.
///
/// Known fields are typed; anything else a loader or store provides is kept
/// in `extra`. Serialises as one flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Originating document (file name or path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// 0-based page number within the source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Sequence index of the chunk within its source unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    /// Open extension map for keys without a typed field.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChunkMetadata {
    /// Metadata for one page of `source`.
    pub fn for_page(source: impl Into<String>, page: u32) -> Self {
        Self {
            source: Some(source.into()),
            page: Some(page),
            ..Self::default()
        }
    }

    /// Build metadata from a store-provided JSON value without failing.
    ///
    /// Typed fields with unexpected shapes (e.g. `"page": "3"`) are kept
    /// verbatim in `extra` instead of being dropped. Non-object values yield
    /// empty metadata.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self::default();
        };

        let source = match map.remove("source") {
            Some(Value::String(s)) => Some(s),
            Some(other) => {
                map.insert("source".to_string(), other);
                None
            }
            None => None,
        };
        let page = take_unsigned(&mut map, "page").map(|p| p as u32);
        let chunk_index = take_unsigned(&mut map, "chunk_index").map(|i| i as usize);

        Self {
            source,
            page,
            chunk_index,
            extra: map,
        }
    }

    /// Serialise to a JSON object value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// True when every key/value in `filter` is present in this metadata.
    ///
    /// An empty filter matches everything. Used by stores that evaluate the
    /// metadata filter locally (JSON containment, one level deep).
    pub fn contains(&self, filter: &Map<String, Value>) -> bool {
        if filter.is_empty() {
            return true;
        }
        let Value::Object(own) = self.to_value() else {
            return false;
        };
        filter.iter().all(|(k, v)| own.get(k) == Some(v))
    }
}

fn take_unsigned(map: &mut Map<String, Value>, key: &str) -> Option<u64> {
    match map.remove(key) {
        Some(Value::Number(n)) if n.as_u64().is_some() => n.as_u64(),
        Some(other) => {
            map.insert(key.to_string(), other);
            None
        }
        None => None,
    }
}

/// One loaded unit of a source document (typically one page).
#[derive(Debug, Clone, PartialEq)]
pub struct SourceUnit {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A bounded, overlapping segment of a source unit's text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Opaque identifier assigned by the vector store to a written record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(pub String);

impl StoreId {
    /// Insertion rank, when the store hands out monotonically increasing
    /// numeric ids (SQLite rowid, Postgres bigserial, in-memory counter).
    pub fn insertion_rank(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Value> for StoreId {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => StoreId(s),
            Value::Null => StoreId(String::new()),
            other => StoreId(other.to_string()),
        }
    }
}

/// A chunk returned by the retrieval engine, annotated with its store id
/// and similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedMatch {
    pub chunk: Chunk,
    pub similarity: f64,
    pub store_id: StoreId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_serialises_flat() {
        let mut meta = ChunkMetadata::for_page("guide.pdf", 2);
        meta.chunk_index = Some(4);
        meta.extra.insert("lang".into(), json!("en"));
        assert_eq!(
            meta.to_value(),
            json!({"source": "guide.pdf", "page": 2, "chunk_index": 4, "lang": "en"})
        );
    }

    #[test]
    fn test_from_value_typed_fields() {
        let meta = ChunkMetadata::from_value(json!({
            "source": "a.pdf", "page": 1, "chunk_index": 0, "author": "x"
        }));
        assert_eq!(meta.source.as_deref(), Some("a.pdf"));
        assert_eq!(meta.page, Some(1));
        assert_eq!(meta.chunk_index, Some(0));
        assert_eq!(meta.extra.get("author"), Some(&json!("x")));
    }

    #[test]
    fn test_from_value_keeps_odd_shapes_in_extra() {
        let meta = ChunkMetadata::from_value(json!({"page": "3", "source": 7}));
        assert_eq!(meta.page, None);
        assert_eq!(meta.source, None);
        assert_eq!(meta.extra.get("page"), Some(&json!("3")));
        assert_eq!(meta.extra.get("source"), Some(&json!(7)));
    }

    #[test]
    fn test_from_value_non_object() {
        assert_eq!(ChunkMetadata::from_value(Value::Null), ChunkMetadata::default());
    }

    #[test]
    fn test_contains_filter() {
        let meta = ChunkMetadata::for_page("a.pdf", 0);
        let mut filter = Map::new();
        assert!(meta.contains(&filter));
        filter.insert("source".into(), json!("a.pdf"));
        assert!(meta.contains(&filter));
        filter.insert("page".into(), json!(1));
        assert!(!meta.contains(&filter));
    }

    #[test]
    fn test_store_id_rank() {
        assert_eq!(StoreId::from(json!(42)).insertion_rank(), Some(42));
        assert_eq!(StoreId::from(json!("17")).insertion_rank(), Some(17));
        assert_eq!(
            StoreId::from(json!("8d1c0e52-uuid")).insertion_rank(),
            None
        );
    }
}
