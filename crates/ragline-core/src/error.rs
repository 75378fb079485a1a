//! Error taxonomy for the ingestion, retrieval, and synthesis pipelines.
//!
//! Caller errors ([`PipelineError::InvalidConfig`], [`PipelineError::Validation`])
//! are raised before any collaborator is invoked. Collaborator failures are
//! tagged with the [`Stage`] that raised them so the caller can report where
//! the pipeline stopped. [`PipelineError::CleanupFailed`] exists so cleanup
//! problems can be logged with a typed value; pipeline entry points never
//! return it.

use std::fmt;

use thiserror::Error;

/// The pipeline step a collaborator failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Loading source units from the document loader.
    Load,
    /// Calling the embedding gateway.
    Embed,
    /// Writing records to the vector store.
    Write,
    /// Running the nearest-neighbor query against the vector store.
    Query,
    /// Calling the language model.
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Embed => "embed",
            Stage::Write => "write",
            Stage::Query => "query",
            Stage::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Chunking parameters violate `0 <= chunk_overlap < chunk_size`.
    #[error("invalid chunking config: {0}")]
    InvalidConfig(String),

    /// Malformed query or synthesis parameters.
    #[error("validation error: {0}")]
    Validation(String),

    /// A loader, embedding, or store-write failure during ingestion.
    #[error("ingestion failed at {stage}: {message}")]
    IngestionFailed { stage: Stage, message: String },

    /// An embedding or store-query failure during retrieval.
    #[error("retrieval failed at {stage}: {message}")]
    RetrievalFailed { stage: Stage, message: String },

    /// The language model errored or returned no usable text.
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Best-effort removal of a temporary resource failed.
    #[error("cleanup failed for {resource}: {message}")]
    CleanupFailed { resource: String, message: String },
}

impl PipelineError {
    /// True for errors caused by the caller's input rather than a collaborator.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidConfig(_) | PipelineError::Validation(_)
        )
    }

    pub(crate) fn ingestion(stage: Stage, err: anyhow::Error) -> Self {
        PipelineError::IngestionFailed {
            stage,
            message: format!("{err:#}"),
        }
    }

    pub(crate) fn retrieval(stage: Stage, err: anyhow::Error) -> Self {
        PipelineError::RetrievalFailed {
            stage,
            message: format!("{err:#}"),
        }
    }
}

/// Convenience alias for pipeline results.
pub type Result<T> = std::result::Result<T, PipelineError>;
