//! Temporary storage for uploaded files.
//!
//! Each upload gets its own directory under the configured temp directory,
//! holding the file under the last component of the client-supplied name.
//! Concurrent uploads with the same name never share a path. The directory
//! is removed after ingestion unless the caller keeps it; removal failures
//! are logged and never change the request outcome.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::warn;

use ragline_core::PipelineError;

/// Reduce a client-supplied filename to its final path component.
///
/// Both `/` and `\` count as separators. Returns `None` when nothing usable
/// remains (`""`, `"."`, `".."`, or a trailing separator).
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    match base {
        "" | "." | ".." => None,
        b if b.contains('\0') => None,
        b => Some(b.to_string()),
    }
}

/// An upload written to its own directory.
///
/// Dropping it without calling [`SavedUpload::keep`] or
/// [`SavedUpload::remove`] deletes the directory synchronously.
#[derive(Debug)]
pub struct SavedUpload {
    dir: TempDir,
    path: PathBuf,
}

impl SavedUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Leave the file on disk and return its path.
    pub fn keep(self) -> PathBuf {
        let _ = self.dir.keep();
        self.path
    }

    /// Delete the upload's directory, logging any failure.
    pub async fn remove(self) {
        let dir = self.dir.keep();
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() == std::io::ErrorKind::NotFound {
                return;
            }
            let err = PipelineError::CleanupFailed {
                resource: dir.display().to_string(),
                message: e.to_string(),
            };
            warn!(error = %err, "temp file cleanup failed");
        }
    }
}

/// Write `bytes` to `filename` inside a fresh directory under `tmp_dir`.
pub async fn save_upload(tmp_dir: &Path, filename: &str, bytes: &[u8]) -> Result<SavedUpload> {
    tokio::fs::create_dir_all(tmp_dir)
        .await
        .with_context(|| format!("Failed to create temp dir {}", tmp_dir.display()))?;
    let dir = tempfile::Builder::new()
        .prefix("upload-")
        .tempdir_in(tmp_dir)
        .with_context(|| format!("Failed to create upload dir in {}", tmp_dir.display()))?;
    let path = dir.path().join(filename);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write upload to {}", path.display()))?;
    Ok(SavedUpload { dir, path })
}
