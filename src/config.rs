//! TOML configuration.
//!
//! Loaded once at startup by [`load_config`] and passed explicitly to each
//! component; nothing else reads process state. Secrets (`OPENAI_API_KEY`,
//! `SUPABASE_URL`, `SUPABASE_KEY`) are taken from the environment when the
//! file leaves them unset.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use ragline_core::split::IngestionConfig;
use ragline_core::synthesize::{DEFAULT_INSTRUCTION, MAX_OUTPUT_TOKENS_RANGE, TEMPERATURE_RANGE};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub openai: OpenAIConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAIConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dims")]
    pub embedding_dims: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            embedding_dims: default_embedding_dims(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            embed_batch_size: default_embed_batch_size(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_chat_model() -> String {
    "gpt-5.2".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dims() -> usize {
    1536
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_embed_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// `supabase` or `sqlite`.
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_match_function")]
    pub match_function: String,
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_key: Option<String>,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            table: default_table(),
            match_function: default_match_function(),
            supabase_url: None,
            supabase_key: None,
            sqlite_path: default_sqlite_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend() -> String {
    "supabase".to_string()
}
fn default_table() -> String {
    "chunks".to_string()
}
fn default_match_function() -> String {
    "match_chunks".to_string()
}
fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./data/ragline.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn ingestion(&self) -> IngestionConfig {
        IngestionConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_max_k")]
    pub max_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            max_k: default_max_k(),
        }
    }
}

fn default_k() -> usize {
    4
}
fn default_max_k() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub default_max_output_tokens: u32,
    #[serde(default = "default_instruction")]
    pub instruction: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            default_temperature: default_temperature(),
            default_max_output_tokens: default_max_output_tokens(),
            instruction: default_instruction(),
        }
    }
}

fn default_temperature() -> f32 {
    0.4
}
fn default_max_output_tokens() -> u32 {
    400
}
fn default_instruction() -> String {
    DEFAULT_INSTRUCTION.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
    /// Upload size cap for `POST /ingest/file`, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            tmp_dir: default_tmp_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_tmp_dir() -> PathBuf {
    PathBuf::from("./tmp")
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

impl Config {
    /// Fill unset secrets from the environment.
    pub fn apply_env(&mut self) {
        if self.openai.api_key.is_none() {
            self.openai.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        if self.store.supabase_url.is_none() {
            self.store.supabase_url = std::env::var("SUPABASE_URL").ok();
        }
        if self.store.supabase_key.is_none() {
            self.store.supabase_key = std::env::var("SUPABASE_KEY").ok();
        }
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        // Validate chunking
        self.chunking
            .ingestion()
            .validate()
            .map_err(|e| anyhow::anyhow!("chunking: {}", e))?;

        // Validate retrieval
        if self.retrieval.max_k == 0 {
            bail!("retrieval.max_k must be >= 1");
        }
        if self.retrieval.default_k == 0 || self.retrieval.default_k > self.retrieval.max_k {
            bail!(
                "retrieval.default_k must be in [1, {}]",
                self.retrieval.max_k
            );
        }

        // Validate synthesis defaults against the request ranges
        if !TEMPERATURE_RANGE.contains(&self.synthesis.default_temperature) {
            bail!("synthesis.default_temperature must be in [0.0, 2.0]");
        }
        if !MAX_OUTPUT_TOKENS_RANGE.contains(&self.synthesis.default_max_output_tokens) {
            bail!("synthesis.default_max_output_tokens must be in [50, 4000]");
        }

        // Validate embedding
        if self.openai.embedding_dims == 0 {
            bail!("openai.embedding_dims must be > 0");
        }
        if self.openai.embed_batch_size == 0 {
            bail!("openai.embed_batch_size must be > 0");
        }

        match self.store.backend.as_str() {
            "supabase" | "sqlite" => {}
            other => bail!(
                "Unknown store backend: '{}'. Must be supabase or sqlite.",
                other
            ),
        }

        Ok(())
    }
}

/// Read, parse, and validate a config file. A missing file yields the
/// defaults, so the service can run from environment variables alone.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    config.apply_env();
    config.validate()?;
    Ok(config)
}
