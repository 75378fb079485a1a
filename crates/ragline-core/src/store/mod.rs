//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the only storage contract the pipeline needs:
//! a batch write and a nearest-neighbor match with optional metadata filter
//! and similarity threshold. Backends: [`memory::InMemoryVectorStore`] here,
//! Supabase and SQLite in the app crate.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Write path consistency
//!
//! `add_records` is not assumed to be transactional. A failure midway can
//! leave part of a batch written. Every [`NewRecord`] carries a deterministic
//! [`content_key`](NewRecord::content_key) so backends that support it can
//! upsert on that key and make re-ingestion idempotent.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::models::{Chunk, ChunkMetadata, EmbeddingVector, StoreId};

/// A chunk plus its embedding, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub embedding: EmbeddingVector,
    /// SHA-256 over source, page, chunk index, and text.
    pub content_key: String,
}

impl NewRecord {
    /// Pair a chunk with its embedding and derive its content key.
    pub fn from_chunk(chunk: Chunk, embedding: EmbeddingVector) -> Self {
        let content_key = content_key(&chunk);
        Self {
            content: chunk.text,
            metadata: chunk.metadata,
            embedding,
            content_key,
        }
    }
}

/// Deterministic identity of a chunk: same source, position, and text
/// always hash to the same key.
pub fn content_key(chunk: &Chunk) -> String {
    let meta = &chunk.metadata;
    let mut hasher = Sha256::new();
    hasher.update(meta.source.as_deref().unwrap_or("").as_bytes());
    hasher.update([0u8]);
    hasher.update(meta.page.unwrap_or(0).to_le_bytes());
    hasher.update((meta.chunk_index.unwrap_or(0) as u64).to_le_bytes());
    hasher.update(chunk.text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Parameters of one nearest-neighbor query.
///
/// Serialises to the payload shape of a Postgres `match_*` function:
/// `{ query_embedding, match_count, filter, match_threshold? }`. The
/// threshold key is omitted when unset so the store applies its own default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchQuery {
    pub query_embedding: EmbeddingVector,
    pub match_count: usize,
    /// Metadata containment filter; empty matches everything.
    pub filter: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_threshold: Option<f64>,
}

/// One row returned by a nearest-neighbor query.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRow {
    pub id: StoreId,
    /// Missing content is mapped to an empty chunk text by the retriever.
    pub content: Option<String>,
    pub metadata: Value,
    pub similarity: f64,
}

/// Abstract vector storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add_records`](VectorStore::add_records) | Persist a batch of embedded chunks |
/// | [`match_records`](VectorStore::match_records) | Nearest-neighbor query |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Persist a batch of records, returning their store-assigned ids in
    /// input order.
    async fn add_records(&self, records: Vec<NewRecord>) -> Result<Vec<StoreId>>;

    /// Return up to `match_count` rows ranked by similarity descending.
    async fn match_records(&self, query: &MatchQuery) -> Result<Vec<StoreRow>>;
}
