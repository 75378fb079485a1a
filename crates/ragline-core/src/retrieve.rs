//! Retrieval engine: embed the query, run a bounded nearest-neighbor match,
//! return ranked [`RetrievedMatch`]es.
//!
//! # Ordering
//!
//! Rows are re-sorted after every store query:
//!
//! 1. similarity, descending;
//! 2. ties: insertion order ascending, when every returned id is a numeric
//!    insertion rank (see [`StoreId::insertion_rank`]);
//! 3. otherwise ties keep the order the store returned them in (stable sort).
//!
//! The result never holds more than `k` matches.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::embedding::Embedder;
use crate::error::{PipelineError, Result, Stage};
use crate::models::{Chunk, ChunkMetadata, RetrievedMatch, StoreId};
use crate::store::{MatchQuery, StoreRow, VectorStore};

/// Default upper bound on `k`.
pub const K_MAX: usize = 20;

/// One similarity search request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalQuery {
    pub query_text: String,
    pub k: usize,
    /// Metadata containment filter; empty matches everything.
    pub filter: Map<String, Value>,
    /// Minimum similarity in `[0, 1]`. `None` leaves the store default.
    pub match_threshold: Option<f64>,
}

impl RetrievalQuery {
    pub fn new(query_text: impl Into<String>, k: usize) -> Self {
        Self {
            query_text: query_text.into(),
            k,
            filter: Map::new(),
            match_threshold: None,
        }
    }

    pub fn with_filter(mut self, filter: Map<String, Value>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.match_threshold = Some(threshold);
        self
    }

    /// Reject malformed queries. `k` above the maximum is clamped later,
    /// not rejected.
    pub fn validate(&self) -> Result<()> {
        if self.query_text.trim().is_empty() {
            return Err(PipelineError::Validation(
                "query must not be empty".to_string(),
            ));
        }
        if self.k == 0 {
            return Err(PipelineError::Validation("k must be >= 1".to_string()));
        }
        if let Some(t) = self.match_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(PipelineError::Validation(format!(
                    "match_threshold must be in [0.0, 1.0], got {t}"
                )));
            }
        }
        Ok(())
    }
}

/// Read path over an [`Embedder`] and a [`VectorStore`].
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    max_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            max_k: K_MAX,
        }
    }

    /// Override the `k` ceiling (minimum 1).
    pub fn with_max_k(mut self, max_k: usize) -> Self {
        self.max_k = max_k.max(1);
        self
    }

    pub fn max_k(&self) -> usize {
        self.max_k
    }

    /// Run a similarity search.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Validation`] for an empty query, `k == 0`, or a
    ///   threshold outside `[0, 1]`; raised before any I/O.
    /// - [`PipelineError::RetrievalFailed`] with stage `embed` or `query`.
    pub async fn search(&self, q: &RetrievalQuery) -> Result<Vec<RetrievedMatch>> {
        q.validate()?;

        let k = q.k.min(self.max_k);
        if k < q.k {
            debug!(requested = q.k, clamped = k, "clamped k");
        }

        let query_embedding = self.embedder.embed(&q.query_text).await.map_err(|e| {
            error!(model = self.embedder.model_name(), error = %e, "query embedding failed");
            PipelineError::retrieval(Stage::Embed, e)
        })?;

        let match_query = MatchQuery {
            query_embedding,
            match_count: k,
            filter: q.filter.clone(),
            match_threshold: q.match_threshold,
        };

        let rows = self.store.match_records(&match_query).await.map_err(|e| {
            error!(backend = self.store.name(), error = %e, "vector store query failed");
            PipelineError::retrieval(Stage::Query, e)
        })?;

        let mut matches: Vec<RetrievedMatch> = rows.into_iter().map(into_match).collect();
        rank(&mut matches);
        matches.truncate(k);

        info!(
            backend = self.store.name(),
            k,
            matches = matches.len(),
            "retrieved matches"
        );
        Ok(matches)
    }
}

fn into_match(row: StoreRow) -> RetrievedMatch {
    RetrievedMatch {
        chunk: Chunk {
            text: row.content.unwrap_or_default(),
            metadata: ChunkMetadata::from_value(row.metadata),
        },
        similarity: row.similarity,
        store_id: row.id,
    }
}

/// Stable sort by similarity desc, insertion order asc on ties.
fn rank(matches: &mut [RetrievedMatch]) {
    let by_rank = matches
        .iter()
        .all(|m| m.store_id.insertion_rank().is_some());

    matches.sort_by(|a, b| {
        let primary = b.similarity.total_cmp(&a.similarity);
        if primary != Ordering::Equal || !by_rank {
            return primary;
        }
        tie_break(&a.store_id, &b.store_id)
    });
}

fn tie_break(a: &StoreId, b: &StoreId) -> Ordering {
    match (a.insertion_rank(), b.insertion_rank()) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmbeddingVector;
    use crate::store::NewRecord;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct Unit;

    #[async_trait]
    impl Embedder for Unit {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<EmbeddingVector>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Returns canned rows and records the last query it saw.
    struct Canned {
        rows: Vec<StoreRow>,
        seen: Mutex<Option<MatchQuery>>,
    }

    impl Canned {
        fn new(rows: Vec<StoreRow>) -> Arc<Self> {
            Arc::new(Self {
                rows,
                seen: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl VectorStore for Canned {
        fn name(&self) -> &str {
            "canned"
        }
        async fn add_records(&self, _: Vec<NewRecord>) -> anyhow::Result<Vec<StoreId>> {
            anyhow::bail!("read-only")
        }
        async fn match_records(&self, query: &MatchQuery) -> anyhow::Result<Vec<StoreRow>> {
            *self.seen.lock().unwrap() = Some(query.clone());
            Ok(self.rows.clone())
        }
    }

    fn row(id: &str, content: Option<&str>, sim: f64) -> StoreRow {
        StoreRow {
            id: StoreId(id.to_string()),
            content: content.map(str::to_string),
            metadata: json!({"source": "a.pdf", "page": 0}),
            similarity: sim,
        }
    }

    #[tokio::test]
    async fn test_rejects_empty_query_and_zero_k() {
        let r = Retriever::new(Arc::new(Unit), Canned::new(vec![]));
        let err = r.search(&RetrievalQuery::new("   ", 4)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        let err = r.search(&RetrievalQuery::new("q", 0)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        let err = r
            .search(&RetrievalQuery::new("q", 1).with_threshold(1.5))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_k_clamped_before_query() {
        let store = Canned::new(vec![]);
        let r = Retriever::new(Arc::new(Unit), store.clone()).with_max_k(5);
        r.search(&RetrievalQuery::new("q", 50)).await.unwrap();
        let seen = store.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.match_count, 5);
        assert_eq!(seen.match_threshold, None);
        assert!(seen.filter.is_empty());
    }

    #[tokio::test]
    async fn test_threshold_and_filter_forwarded() {
        let store = Canned::new(vec![]);
        let r = Retriever::new(Arc::new(Unit), store.clone());
        let mut filter = Map::new();
        filter.insert("source".into(), json!("a.pdf"));
        r.search(&RetrievalQuery::new("q", 3).with_filter(filter.clone()).with_threshold(0.4))
            .await
            .unwrap();
        let seen = store.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.match_threshold, Some(0.4));
        assert_eq!(seen.filter, filter);
        assert_eq!(seen.query_embedding, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_resorts_and_truncates() {
        let store = Canned::new(vec![
            row("3", Some("c"), 0.5),
            row("1", Some("a"), 0.9),
            row("4", Some("d"), 0.9),
            row("2", Some("b"), 0.9),
        ]);
        let r = Retriever::new(Arc::new(Unit), store);
        let matches = r.search(&RetrievalQuery::new("q", 3)).await.unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.store_id.0.as_str()).collect();
        assert_eq!(ids, ["1", "2", "4"]);
    }

    #[tokio::test]
    async fn test_opaque_ids_keep_store_order_on_ties() {
        let store = Canned::new(vec![
            row("b-uuid", Some("b"), 0.7),
            row("a-uuid", Some("a"), 0.7),
        ]);
        let r = Retriever::new(Arc::new(Unit), store);
        let matches = r.search(&RetrievalQuery::new("q", 5)).await.unwrap();
        assert_eq!(matches[0].chunk.text, "b");
        assert_eq!(matches[1].chunk.text, "a");
    }

    #[tokio::test]
    async fn test_missing_content_defaults_empty() {
        let r = Retriever::new(Arc::new(Unit), Canned::new(vec![row("1", None, 0.8)]));
        let matches = r.search(&RetrievalQuery::new("q", 1)).await.unwrap();
        assert_eq!(matches[0].chunk.text, "");
        assert_eq!(matches[0].chunk.metadata.source.as_deref(), Some("a.pdf"));
        assert_eq!(matches[0].similarity, 0.8);
    }

    #[tokio::test]
    async fn test_store_failure_is_retrieval_failed() {
        struct Down;
        #[async_trait]
        impl VectorStore for Down {
            fn name(&self) -> &str {
                "down"
            }
            async fn add_records(&self, _: Vec<NewRecord>) -> anyhow::Result<Vec<StoreId>> {
                anyhow::bail!("down")
            }
            async fn match_records(&self, _: &MatchQuery) -> anyhow::Result<Vec<StoreRow>> {
                anyhow::bail!("connection refused")
            }
        }
        let r = Retriever::new(Arc::new(Unit), Arc::new(Down));
        let err = r.search(&RetrievalQuery::new("q", 1)).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RetrievalFailed {
                stage: Stage::Query,
                ..
            }
        ));
    }
}
