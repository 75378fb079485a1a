//! Document loader trait.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::SourceUnit;

/// Loads a source document into ordered [`SourceUnit`]s (one per page for
/// paged formats).
///
/// Must fail when the file is unreadable or malformed. An empty document
/// may yield units with empty text; the splitter skips those.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, source: &Path) -> Result<Vec<SourceUnit>>;
}
