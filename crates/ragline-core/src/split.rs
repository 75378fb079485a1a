//! Fixed-size, overlapping text splitter.
//!
//! Each [`SourceUnit`] is split on its own so per-unit metadata (source,
//! page) stays attributable to every chunk it produces. Windows are measured
//! in characters (Unicode scalar values), never bytes, so multi-byte text is
//! never cut mid-character.
//!
//! # Algorithm
//!
//! 1. Reject configs where `chunk_size == 0` or `chunk_overlap >= chunk_size`.
//! 2. For each unit, emit a window of `chunk_size` characters.
//! 3. Advance the window start by `chunk_size - chunk_overlap`.
//! 4. Stop once a window reaches the end of the text; that last window keeps
//!    whatever remains (shorter, never padded, never dropped).
//! 5. Each chunk inherits the unit's metadata plus its `chunk_index`.
//!
//! # Example
//!
//! ```rust
//! use ragline_core::models::{ChunkMetadata, SourceUnit};
//! use ragline_core::split::{split, IngestionConfig};
//!
//! let unit = SourceUnit {
//!     text: "abcdefghij".to_string(),
//!     metadata: ChunkMetadata::for_page("notes.txt", 0),
//! };
//! let cfg = IngestionConfig::new(4, 1).unwrap();
//! let chunks = split(&[unit], &cfg).unwrap();
//! let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
//! assert_eq!(texts, ["abcd", "defg", "ghij"]);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::{Chunk, SourceUnit};

/// Chunking parameters for one ingestion call.
///
/// Invariant: `0 <= chunk_overlap < chunk_size`. Otherwise the window would
/// never advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl IngestionConfig {
    /// Build a validated config.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let cfg = Self {
            chunk_size,
            chunk_overlap,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the size/overlap invariant.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(PipelineError::InvalidConfig(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Characters the window advances by on each step.
    fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

/// Split source units into overlapping chunks.
///
/// Returns chunks in unit order, then window order. Units with empty text
/// contribute nothing.
///
/// # Errors
///
/// [`PipelineError::InvalidConfig`] when the config violates its invariant.
pub fn split(units: &[SourceUnit], cfg: &IngestionConfig) -> Result<Vec<Chunk>> {
    cfg.validate()?;

    let mut chunks = Vec::new();
    for unit in units {
        split_unit(unit, cfg, &mut chunks);
    }
    Ok(chunks)
}

fn split_unit(unit: &SourceUnit, cfg: &IngestionConfig, out: &mut Vec<Chunk>) {
    let text = unit.text.as_str();
    if text.is_empty() {
        return;
    }

    // Byte offset of every char start, plus the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;

    let mut start = 0;
    let mut chunk_index = 0;
    loop {
        let end = (start + cfg.chunk_size).min(char_len);

        let mut metadata = unit.metadata.clone();
        metadata.chunk_index = Some(chunk_index);
        out.push(Chunk {
            text: text[bounds[start]..bounds[end]].to_string(),
            metadata,
        });

        if end == char_len {
            break;
        }
        start += cfg.step();
        chunk_index += 1;
    }
}
