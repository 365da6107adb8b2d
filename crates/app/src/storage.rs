//! Object storage collaborator contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use narravox_foundation::error::EngineError;
use narravox_jobs::ContentSource;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Time-limited URL for streaming or downloading a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrl {
    pub url: String,
    pub key: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under `key`; returns the key.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, EngineError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, EngineError>;

    async fn get_presigned_url(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<PresignedUrl, EngineError>;
}

/// Resolve a job's input text: inline content directly, stored content
/// through the object store.
pub async fn load_text(
    objects: &Arc<dyn ObjectStore>,
    source: &ContentSource,
) -> Result<String, EngineError> {
    match source {
        ContentSource::Inline { text } => Ok(text.clone()),
        ContentSource::Stored { key } => {
            let bytes = objects.get(key).await?;
            String::from_utf8(bytes)
                .map_err(|e| EngineError::Storage(format!("object {key} is not UTF-8: {e}")))
        }
    }
}

/// In-memory object store for single-process deployments and tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, EngineError> {
        self.objects.write().insert(key.to_string(), bytes);
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, EngineError> {
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::Storage(format!("no object at {key}")))
    }

    async fn get_presigned_url(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<PresignedUrl, EngineError> {
        if !self.contains(key) {
            return Err(EngineError::Storage(format!("no object at {key}")));
        }
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| EngineError::Storage(format!("invalid ttl: {e}")))?;
        Ok(PresignedUrl {
            url: format!("memory://{key}?expires={}", expires_at.timestamp()),
            key: key.to_string(),
            expires_at,
        })
    }
}
