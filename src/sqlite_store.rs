//! SQLite vector store.
//!
//! Embeddings are stored as little-endian f32 BLOBs next to the chunk text
//! and JSON metadata. Matching is a brute-force cosine scan over the rows
//! that pass the metadata filter, which is fine for local corpora of a few
//! hundred thousand chunks.
//!
//! Writes upsert on `content_key`, so ingesting the same file twice keeps
//! one row per chunk and returns the original ids.

use std::cmp::Ordering;
use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use ragline_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use ragline_core::models::{ChunkMetadata, StoreId};
use ragline_core::store::{MatchQuery, NewRecord, StoreRow, VectorStore};

use crate::db;
use crate::migrate;

pub struct SqliteStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteStore {
    /// Open the database at `path` and make sure `table` exists.
    pub async fn open(path: &Path, table: &str) -> Result<Self> {
        let pool = db::connect(path)
            .await
            .with_context(|| format!("Failed to open SQLite store at {}", path.display()))?;
        Self::from_pool(pool, table).await
    }

    pub async fn from_pool(pool: SqlitePool, table: &str) -> Result<Self> {
        migrate::run_migrations(&pool, table).await?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn add_records(&self, records: Vec<NewRecord>) -> Result<Vec<StoreId>> {
        let sql = format!(
            r#"
            INSERT INTO {} (content_key, content, metadata, embedding, dims)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(content_key) DO UPDATE SET
                content = excluded.content,
                metadata = excluded.metadata,
                embedding = excluded.embedding,
                dims = excluded.dims
            RETURNING id
            "#,
            self.table
        );

        let mut tx = self.pool.begin().await?;

        let stored_dims: Option<i64> =
            sqlx::query_scalar(&format!("SELECT dims FROM {} LIMIT 1", self.table))
                .fetch_optional(&mut *tx)
                .await?;
        let expected = stored_dims
            .map(|d| d as usize)
            .or_else(|| records.first().map(|r| r.embedding.len()));
        if let Some(expected) = expected {
            if let Some(bad) = records.iter().find(|r| r.embedding.len() != expected) {
                bail!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    expected,
                    bad.embedding.len()
                );
            }
        }

        let mut ids = Vec::with_capacity(records.len());

        for r in &records {
            let metadata = serde_json::to_string(&r.metadata)?;
            let id: i64 = sqlx::query_scalar(&sql)
                .bind(&r.content_key)
                .bind(&r.content)
                .bind(metadata)
                .bind(vec_to_blob(&r.embedding))
                .bind(r.embedding.len() as i64)
                .fetch_one(&mut *tx)
                .await?;
            ids.push(StoreId(id.to_string()));
        }

        tx.commit().await?;
        debug!(table = %self.table, rows = ids.len(), "upserted rows");
        Ok(ids)
    }

    async fn match_records(&self, query: &MatchQuery) -> Result<Vec<StoreRow>> {
        let rows = sqlx::query(&format!(
            "SELECT id, content, metadata, embedding, dims FROM {}",
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::new();
        for row in rows {
            let dims: i64 = row.get("dims");
            if dims as usize != query.query_embedding.len() {
                bail!(
                    "Embedding dimension mismatch: query has {}, stored rows have {}",
                    query.query_embedding.len(),
                    dims
                );
            }

            let id: i64 = row.get("id");
            let metadata_json: String = row.get("metadata");
            let metadata = match serde_json::from_str(&metadata_json) {
                Ok(value) => ChunkMetadata::from_value(value),
                Err(e) => {
                    warn!(table = %self.table, id, error = %e, "corrupt chunk metadata");
                    ChunkMetadata::default()
                }
            };
            if !metadata.contains(&query.filter) {
                continue;
            }

            let blob: Vec<u8> = row.get("embedding");
            let sim = cosine_similarity(&query.query_embedding, &blob_to_vec(&blob)) as f64;
            if query.match_threshold.is_some_and(|t| sim < t) {
                continue;
            }

            let content: String = row.get("content");
            scored.push((id, content, metadata, sim));
        }

        scored.sort_by(|a, b| {
            b.3.partial_cmp(&a.3)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(query.match_count);

        Ok(scored
            .into_iter()
            .map(|(id, content, metadata, similarity)| StoreRow {
                id: StoreId(id.to_string()),
                content: Some(content),
                metadata: metadata.to_value(),
                similarity,
            })
            .collect())
    }
}
