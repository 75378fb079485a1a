//! Ingestion orchestrator: load → split → embed → write.
//!
//! Any failure aborts the whole call with
//! [`PipelineError::IngestionFailed`] naming the stage. Records already
//! written by a failed `add_records` call are not rolled back; backends
//! that upsert on [`NewRecord::content_key`] make a retry safe.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::embedding::{check_batch, Embedder};
use crate::error::{PipelineError, Result, Stage};
use crate::loader::DocumentLoader;
use crate::split::{split, IngestionConfig};
use crate::store::{NewRecord, VectorStore};

/// Default number of chunk texts sent per embedding request.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// Wires a loader, embedder, and vector store into the write path.
#[derive(Clone)]
pub struct Ingestor {
    loader: Arc<dyn DocumentLoader>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    embed_batch_size: usize,
}

impl Ingestor {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            loader,
            embedder,
            store,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }

    /// Set how many chunks go into one embedding request (minimum 1).
    pub fn with_embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch_size = size.max(1);
        self
    }

    /// Ingest one source document. Returns the number of chunks written.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidConfig`] before any I/O when `cfg` is invalid.
    /// - [`PipelineError::IngestionFailed`] with stage `load`, `embed`, or
    ///   `write` when a collaborator fails.
    pub async fn ingest(&self, source: &Path, cfg: &IngestionConfig) -> Result<usize> {
        cfg.validate()?;

        let units = self.loader.load(source).await.map_err(|e| {
            error!(source = %source.display(), error = %format_args!("{e:#}"), "document load failed");
            PipelineError::ingestion(Stage::Load, e)
        })?;

        let chunks = split(&units, cfg)?;
        debug!(
            source = %source.display(),
            units = units.len(),
            chunks = chunks.len(),
            "split document"
        );
        if chunks.is_empty() {
            info!(source = %source.display(), chunks_added = 0, "ingested document (empty)");
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.embed_batch_size) {
            let batch_vectors = self
                .embedder
                .embed_batch(batch)
                .await
                .and_then(|v| {
                    check_batch(&v, batch.len(), self.embedder.dims())?;
                    Ok(v)
                })
                .map_err(|e| {
                    error!(
                        source = %source.display(),
                        model = self.embedder.model_name(),
                        error = %e,
                        "embedding failed during ingestion"
                    );
                    PipelineError::ingestion(Stage::Embed, e)
                })?;
            vectors.extend(batch_vectors);
        }

        let records: Vec<NewRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| NewRecord::from_chunk(chunk, vector))
            .collect();
        let count = records.len();

        self.store.add_records(records).await.map_err(|e| {
            error!(
                source = %source.display(),
                backend = self.store.name(),
                error = %e,
                "store write failed during ingestion"
            );
            PipelineError::ingestion(Stage::Write, e)
        })?;

        info!(
            source = %source.display(),
            backend = self.store.name(),
            chunks_added = count,
            "ingested document"
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, EmbeddingVector, SourceUnit};
    use crate::store::memory::InMemoryVectorStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Pages(Vec<&'static str>);

    #[async_trait]
    impl DocumentLoader for Pages {
        async fn load(&self, source: &Path) -> anyhow::Result<Vec<SourceUnit>> {
            Ok(self
                .0
                .iter()
                .enumerate()
                .map(|(i, t)| SourceUnit {
                    text: t.to_string(),
                    metadata: ChunkMetadata::for_page(source.display().to_string(), i as u32),
                })
                .collect())
        }
    }

    struct Broken;

    #[async_trait]
    impl DocumentLoader for Broken {
        async fn load(&self, _: &Path) -> anyhow::Result<Vec<SourceUnit>> {
            anyhow::bail!("not a PDF")
        }
    }

    struct Counting {
        calls: AtomicUsize,
        dims: usize,
    }

    #[async_trait]
    impl Embedder for Counting {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<EmbeddingVector>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32; self.dims]).collect())
        }
    }

    fn counting(dims: usize) -> Arc<Counting> {
        Arc::new(Counting {
            calls: AtomicUsize::new(0),
            dims,
        })
    }

    #[tokio::test]
    async fn test_ingest_counts_and_batches() {
        let embedder = counting(2);
        let store = Arc::new(InMemoryVectorStore::new());
        let ingestor = Ingestor::new(
            Arc::new(Pages(vec!["abcdefghij", "klmnop"])),
            embedder.clone(),
            store.clone(),
        )
        .with_embed_batch_size(2);

        let cfg = IngestionConfig::new(4, 1).unwrap();
        let added = ingestor.ingest(Path::new("doc.pdf"), &cfg).await.unwrap();
        // page 0: abcd defg ghij, page 1: klmn nop
        assert_eq!(added, 5);
        assert_eq!(store.len(), 5);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalid_config_before_io() {
        let ingestor = Ingestor::new(
            Arc::new(Broken),
            counting(2),
            Arc::new(InMemoryVectorStore::new()),
        );
        let cfg = IngestionConfig {
            chunk_size: 100,
            chunk_overlap: 100,
        };
        let err = ingestor.ingest(Path::new("x"), &cfg).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_loader_failure_stage() {
        let ingestor = Ingestor::new(
            Arc::new(Broken),
            counting(2),
            Arc::new(InMemoryVectorStore::new()),
        );
        let cfg = IngestionConfig::new(100, 10).unwrap();
        let err = ingestor.ingest(Path::new("x"), &cfg).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::IngestionFailed {
                stage: Stage::Load,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_embed_failure() {
        let store = Arc::new(InMemoryVectorStore::new());
        let ingestor = Ingestor::new(Arc::new(Pages(vec!["hello"])), counting(3), store.clone());
        let cfg = IngestionConfig::new(100, 10).unwrap();
        let err = ingestor.ingest(Path::new("x"), &cfg).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::IngestionFailed {
                stage: Stage::Embed,
                ..
            }
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_stage() {
        let store = Arc::new(InMemoryVectorStore::new().with_dims(8));
        let ingestor = Ingestor::new(Arc::new(Pages(vec!["hello"])), counting(2), store);
        let cfg = IngestionConfig::new(100, 10).unwrap();
        let err = ingestor.ingest(Path::new("x"), &cfg).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::IngestionFailed {
                stage: Stage::Write,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_document_writes_nothing() {
        let embedder = counting(2);
        let ingestor = Ingestor::new(
            Arc::new(Pages(vec!["", ""])),
            embedder.clone(),
            Arc::new(InMemoryVectorStore::new()),
        );
        let cfg = IngestionConfig::new(100, 10).unwrap();
        assert_eq!(ingestor.ingest(Path::new("x"), &cfg).await.unwrap(), 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }
}
