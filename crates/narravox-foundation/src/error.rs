use std::time::Duration;
use thiserror::Error;

/// Errors returned by a speech-synthesis provider for a single call.
///
/// The transient/permanent split is carried as data so retry loops can
/// branch on it instead of downcasting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider rate limited: {0}")]
    RateLimited(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("content rejected by provider: {0}")]
    ContentRejected(String),

    #[error("provider rejected request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Whether a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::RateLimited(_)
                | ProviderError::Unavailable(_)
        )
    }
}

/// Errors from the transactional row store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("row not found: {0}")]
    NotFound(String),

    #[error("version conflict on {entity}: expected {expected}, found {found}")]
    VersionConflict {
        entity: String,
        expected: u64,
        found: u64,
    },
}

/// Top-level error taxonomy for the orchestration engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid job configuration: {0}")]
    Validation(String),

    #[error("synthesis provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("corrupt audio for chunk {chunk_index}: {reason}")]
    Concatenation { chunk_index: usize, reason: String },

    #[error("object storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid job transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("cancellation requested")]
    Cancelled,
}

impl EngineError {
    /// Whether the operation that produced this error is worth retrying.
    ///
    /// Version conflicts retry the compare-and-set, transient provider
    /// errors retry the call. Everything else surfaces to the job.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Provider(p) => p.is_transient(),
            EngineError::Store(StoreError::VersionConflict { .. }) => true,
            _ => false,
        }
    }
}
