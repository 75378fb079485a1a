//! Wires configuration into the three pipeline stages.
//!
//! [`Service`] owns one [`Ingestor`], [`Retriever`], and [`Synthesizer`]
//! sharing the same embedder and vector store. The HTTP server and the CLI
//! both go through it, so request defaults are applied in one place.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use ragline_core::embedding::Embedder;
use ragline_core::ingest::Ingestor;
use ragline_core::loader::DocumentLoader;
use ragline_core::models::RetrievedMatch;
use ragline_core::retrieve::{RetrievalQuery, Retriever};
use ragline_core::split::IngestionConfig;
use ragline_core::store::VectorStore;
use ragline_core::synthesize::{LanguageModel, SynthesisRequest, Synthesizer};

use crate::config::Config;
use crate::loader::FileLoader;
use crate::openai::{OpenAIClient, OpenAIEmbedder, OpenAIResponses};
use crate::sqlite_store::SqliteStore;
use crate::supabase::SupabaseStore;

/// Characters of chunk text echoed back per source.
pub const PREVIEW_CHARS: usize = 500;

/// Body of `POST /chat` and input of `ragline ask`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub filter: Option<Map<String, Value>>,
    #[serde(default)]
    pub match_threshold: Option<f64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            k: None,
            filter: None,
            match_threshold: None,
            model: None,
            max_output_tokens: None,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceDoc {
    pub content_preview: String,
    pub metadata: Value,
}

impl SourceDoc {
    fn from_match(m: &RetrievedMatch) -> Self {
        Self {
            content_preview: m.chunk.text.chars().take(PREVIEW_CHARS).collect(),
            metadata: m.chunk.metadata.to_value(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceDoc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub chunks_added: usize,
    pub table_name: String,
    pub match_function: String,
}

/// Build the embedding gateway from `[openai]`.
pub fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let client = OpenAIClient::new(&config.openai)?;
    Ok(Arc::new(OpenAIEmbedder::new(client, &config.openai)))
}

/// Build the language model from `[openai]`.
pub fn create_llm(config: &Config) -> Result<Arc<dyn LanguageModel>> {
    let client = OpenAIClient::new(&config.openai)?;
    Ok(Arc::new(OpenAIResponses::new(client)))
}

/// Build the vector store selected by `store.backend`.
pub async fn create_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    match config.store.backend.as_str() {
        "supabase" => Ok(Arc::new(SupabaseStore::new(&config.store)?)),
        "sqlite" => Ok(Arc::new(
            SqliteStore::open(&config.store.sqlite_path, &config.store.table).await?,
        )),
        other => bail!("Unknown store backend: '{}'", other),
    }
}

#[derive(Clone)]
pub struct Service {
    config: Arc<Config>,
    ingestor: Ingestor,
    retriever: Retriever,
    synthesizer: Synthesizer,
}

impl Service {
    /// Build every collaborator from configuration.
    pub async fn from_config(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config)?;
        let llm = create_llm(&config)?;
        let store = create_store(&config).await?;
        Ok(Self::from_parts(
            config,
            Arc::new(FileLoader::new()),
            embedder,
            store,
            llm,
        ))
    }

    /// Assemble a service from explicit collaborators.
    pub fn from_parts(
        config: Config,
        loader: Arc<dyn DocumentLoader>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        let ingestor = Ingestor::new(loader, embedder.clone(), store.clone())
            .with_embed_batch_size(config.openai.embed_batch_size);
        let retriever = Retriever::new(embedder, store).with_max_k(config.retrieval.max_k);
        let synthesizer = Synthesizer::new(llm).with_instruction(config.synthesis.instruction.clone());
        Self {
            config: Arc::new(config),
            ingestor,
            retriever,
            synthesizer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Chunking parameters with `None` values taken from `[chunking]`.
    pub fn ingestion_config(
        &self,
        chunk_size: Option<usize>,
        chunk_overlap: Option<usize>,
    ) -> IngestionConfig {
        IngestionConfig {
            chunk_size: chunk_size.unwrap_or(self.config.chunking.chunk_size),
            chunk_overlap: chunk_overlap.unwrap_or(self.config.chunking.chunk_overlap),
        }
    }

    /// Ingest one file; `None` chunking values fall back to `[chunking]`.
    pub async fn ingest(
        &self,
        path: &Path,
        chunk_size: Option<usize>,
        chunk_overlap: Option<usize>,
    ) -> ragline_core::error::Result<IngestResponse> {
        let cfg = self.ingestion_config(chunk_size, chunk_overlap);
        let chunks_added = self.ingestor.ingest(path, &cfg).await?;
        Ok(IngestResponse {
            chunks_added,
            table_name: self.config.store.table.clone(),
            match_function: self.config.store.match_function.clone(),
        })
    }

    /// Similarity search with request defaults applied.
    pub async fn search(&self, req: &ChatRequest) -> ragline_core::error::Result<Vec<RetrievedMatch>> {
        let mut query = RetrievalQuery::new(
            req.query.clone(),
            req.k.unwrap_or(self.config.retrieval.default_k),
        );
        if let Some(filter) = &req.filter {
            query = query.with_filter(filter.clone());
        }
        if let Some(t) = req.match_threshold {
            query = query.with_threshold(t);
        }
        self.retriever.search(&query).await
    }

    /// Retrieve, then synthesize an answer grounded in the matches.
    pub async fn chat(&self, req: &ChatRequest) -> ragline_core::error::Result<ChatResponse> {
        let synthesis = SynthesisRequest {
            query_text: req.query.clone(),
            matches: Vec::new(),
            model_id: req
                .model
                .clone()
                .unwrap_or_else(|| self.config.openai.chat_model.clone()),
            max_output_tokens: req
                .max_output_tokens
                .unwrap_or(self.config.synthesis.default_max_output_tokens),
            temperature: req
                .temperature
                .unwrap_or(self.config.synthesis.default_temperature),
        };
        // Generation parameters are checked before any I/O.
        synthesis.validate()?;

        let matches = self.search(req).await?;
        let sources = matches.iter().map(SourceDoc::from_match).collect();
        let synthesis = SynthesisRequest {
            matches,
            ..synthesis
        };
        let answer = self.synthesizer.synthesize(&synthesis).await?;

        info!(sources = synthesis.matches.len(), "chat answered");
        Ok(ChatResponse { answer, sources })
    }
}
