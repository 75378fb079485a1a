//! In-memory [`VectorStore`] for tests and embedded use.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`. Matching is
//! brute-force cosine similarity over every stored vector, with the
//! metadata filter evaluated as JSON containment. Ids are a monotonically
//! increasing counter, so they double as insertion order.

use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{ChunkMetadata, EmbeddingVector, StoreId};

use super::{MatchQuery, NewRecord, StoreRow, VectorStore};

struct StoredRecord {
    id: u64,
    content_key: String,
    content: String,
    metadata: ChunkMetadata,
    embedding: EmbeddingVector,
}

#[derive(Default)]
struct Inner {
    records: Vec<StoredRecord>,
    next_id: u64,
}

/// In-memory vector store.
///
/// Writes upsert on [`NewRecord::content_key`]: re-adding a known key
/// replaces its content and vector but keeps its original id.
pub struct InMemoryVectorStore {
    inner: RwLock<Inner>,
    dims: Option<usize>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                records: Vec::new(),
                next_id: 1,
            }),
            dims: None,
        }
    }

    /// Reject vectors whose length differs from `dims`.
    pub fn with_dims(mut self, dims: usize) -> Self {
        self.dims = Some(dims);
        self
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.read().map(|g| g.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_dims(&self, v: &[f32]) -> Result<()> {
        match self.dims {
            Some(d) if d != v.len() => {
                bail!("vector has {} dims, store expects {}", v.len(), d)
            }
            _ => Ok(()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn add_records(&self, records: Vec<NewRecord>) -> Result<Vec<StoreId>> {
        for r in &records {
            self.check_dims(&r.embedding)?;
        }

        let mut inner = self
            .inner
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        let mut ids = Vec::with_capacity(records.len());

        for r in records {
            if let Some(existing) = inner
                .records
                .iter_mut()
                .find(|s| s.content_key == r.content_key)
            {
                existing.content = r.content;
                existing.metadata = r.metadata;
                existing.embedding = r.embedding;
                ids.push(StoreId(existing.id.to_string()));
                continue;
            }

            let id = inner.next_id;
            inner.next_id += 1;
            inner.records.push(StoredRecord {
                id,
                content_key: r.content_key,
                content: r.content,
                metadata: r.metadata,
                embedding: r.embedding,
            });
            ids.push(StoreId(id.to_string()));
        }

        Ok(ids)
    }

    async fn match_records(&self, query: &MatchQuery) -> Result<Vec<StoreRow>> {
        self.check_dims(&query.query_embedding)?;

        let inner = self
            .inner
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;

        let mut scored: Vec<(&StoredRecord, f64)> = inner
            .records
            .iter()
            .filter(|r| r.metadata.contains(&query.filter))
            .map(|r| {
                let sim = cosine_similarity(&query.query_embedding, &r.embedding) as f64;
                (r, sim)
            })
            .filter(|(_, sim)| query.match_threshold.map_or(true, |t| *sim >= t))
            .collect();

        scored.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        scored.truncate(query.match_count);

        Ok(scored
            .into_iter()
            .map(|(r, sim)| StoreRow {
                id: StoreId(r.id.to_string()),
                content: Some(r.content.clone()),
                metadata: r.metadata.to_value(),
                similarity: sim,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use serde_json::{json, Map};

    fn record(text: &str, page: u32, embedding: Vec<f32>) -> NewRecord {
        NewRecord::from_chunk(
            Chunk {
                text: text.to_string(),
                metadata: ChunkMetadata::for_page("doc.pdf", page),
            },
            embedding,
        )
    }

    fn query(v: Vec<f32>, k: usize) -> MatchQuery {
        MatchQuery {
            query_embedding: v,
            match_count: k,
            filter: Map::new(),
            match_threshold: None,
        }
    }

    #[tokio::test]
    async fn test_ranked_descending_and_bounded() {
        let store = InMemoryVectorStore::new();
        store
            .add_records(vec![
                record("east", 0, vec![1.0, 0.0]),
                record("north", 0, vec![0.0, 1.0]),
                record("north-east", 0, vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let rows = store.match_records(&query(vec![1.0, 0.1], 2)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].content.as_deref(), Some("east"));
        assert_eq!(rows[1].content.as_deref(), Some("north-east"));
        assert!(rows[0].similarity >= rows[1].similarity);
    }

    #[tokio::test]
    async fn test_ties_in_insertion_order() {
        let store = InMemoryVectorStore::new();
        store
            .add_records(vec![
                record("first", 0, vec![1.0, 0.0]),
                record("second", 1, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();
        let rows = store.match_records(&query(vec![1.0, 0.0], 5)).await.unwrap();
        assert_eq!(rows[0].id, StoreId("1".into()));
        assert_eq!(rows[1].id, StoreId("2".into()));
    }

    #[tokio::test]
    async fn test_threshold_and_filter() {
        let store = InMemoryVectorStore::new();
        store
            .add_records(vec![
                record("p0", 0, vec![1.0, 0.0]),
                record("p1", 1, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let mut q = query(vec![1.0, 0.0], 5);
        q.match_threshold = Some(0.99);
        let rows = store.match_records(&q).await.unwrap();
        assert_eq!(rows.len(), 1);

        let mut q = query(vec![1.0, 0.0], 5);
        q.filter.insert("page".into(), json!(1));
        let rows = store.match_records(&q).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_readd_same_key_is_idempotent() {
        let store = InMemoryVectorStore::new();
        let ids1 = store
            .add_records(vec![record("same", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        let ids2 = store
            .add_records(vec![record("same", 0, vec![0.5, 0.5])])
            .await
            .unwrap();
        assert_eq!(ids1, ids2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_dims_enforced() {
        let store = InMemoryVectorStore::new().with_dims(3);
        let err = store
            .add_records(vec![record("x", 0, vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expects 3"));
    }
}
