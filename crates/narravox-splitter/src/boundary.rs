//! Optional boundary-analysis collaborator.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoundaryError {
    #[error("boundary analysis unavailable: {0}")]
    Unavailable(String),
}

/// External chapter-analysis service (typically LLM-backed), used only
/// to refine the content heuristic. Best-effort: any failure is logged
/// and the heuristic result stands on its own.
#[async_trait]
pub trait BoundaryAnalyzer: Send + Sync {
    /// Suggested chapter-start byte offsets into `text`.
    async fn analyze(&self, text: &str) -> Result<Vec<usize>, BoundaryError>;
}
