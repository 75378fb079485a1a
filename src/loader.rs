//! File loader: turns a file on disk into per-page [`SourceUnit`]s.
//!
//! | Extension | Units |
//! |-----------|-------|
//! | `.pdf` | One per page, `page` is 0-based |
//! | `.txt`, `.md` | One unit, page 0 |
//!
//! Every unit's `source` is the file name without its directory, so
//! documents ingested through a temp directory keep a stable source.
//!
//! PDF parsing is CPU-bound and runs on the blocking thread pool.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use ragline_core::loader::DocumentLoader;
use ragline_core::models::{ChunkMetadata, SourceUnit};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl FileLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentLoader for FileLoader {
    async fn load(&self, source: &Path) -> Result<Vec<SourceUnit>> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        let ext = source
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let bytes = tokio::fs::read(source).await.map_err(|e| LoadError::Io {
            path: source.display().to_string(),
            source: e,
        })?;

        let units = match ext.as_str() {
            "pdf" => {
                let pages = tokio::task::spawn_blocking(move || {
                    pdf_extract::extract_text_from_mem_by_pages(&bytes)
                        .map_err(|e| LoadError::Pdf(e.to_string()))
                })
                .await
                .map_err(|e| LoadError::Pdf(e.to_string()))??;
                page_units(&name, pages)
            }
            "txt" | "md" => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                vec![SourceUnit {
                    text,
                    metadata: ChunkMetadata::for_page(name.clone(), 0),
                }]
            }
            other => return Err(LoadError::UnsupportedType(other.to_string()).into()),
        };

        debug!(source = %name, units = units.len(), "loaded document");
        Ok(units)
    }
}

/// One unit per extracted page, numbered from 0 in document order.
pub fn page_units(source: &str, pages: Vec<String>) -> Vec<SourceUnit> {
    pages
        .into_iter()
        .enumerate()
        .map(|(page, text)| SourceUnit {
            text,
            metadata: ChunkMetadata::for_page(source, page as u32),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_units_numbering() {
        let units = page_units(
            "doc.pdf",
            vec!["one".to_string(), "two".to_string(), "three".to_string()],
        );
        assert_eq!(units.len(), 3);
        assert_eq!(units[1].text, "two");
        assert_eq!(units[1].metadata.page, Some(1));
        assert_eq!(units[2].metadata.source.as_deref(), Some("doc.pdf"));
    }

    #[tokio::test]
    async fn test_load_text_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("notes.md");
        std::fs::write(&path, "# Notes\nhello").unwrap();
        let units = FileLoader::new().load(&path).await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].metadata.source.as_deref(), Some("notes.md"));
        assert!(units[0].text.contains("hello"));
    }

    #[tokio::test]
    async fn test_unsupported_and_missing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("sheet.xlsx");
        std::fs::write(&path, b"PK").unwrap();
        let err = FileLoader::new().load(&path).await.unwrap_err();
        assert!(err.to_string().contains("unsupported"));

        let absent = tmp.path().join("absent.pdf");
        let err = FileLoader::new().load(&absent).await.unwrap_err();
        let io = std::fs::read(&absent).unwrap_err().to_string();
        let chain = format!("{err:#}");
        assert!(chain.starts_with("failed to read"));
        assert_eq!(chain.matches(io.as_str()).count(), 1, "{chain}");
    }

    #[tokio::test]
    async fn test_malformed_pdf_fails() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();
        assert!(FileLoader::new().load(&path).await.is_err());
    }
}
