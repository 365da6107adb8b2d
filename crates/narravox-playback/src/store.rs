//! Progress row persistence contract.

use crate::tracker::PlaybackProgress;
use async_trait::async_trait;
use narravox_foundation::error::StoreError;
use narravox_foundation::{JobId, UserId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// One row per (user, job); mutated only by the tracker.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get(
        &self,
        user_id: &UserId,
        job_id: &JobId,
    ) -> Result<Option<PlaybackProgress>, StoreError>;

    async fn upsert(&self, row: PlaybackProgress) -> Result<(), StoreError>;

    /// Returns whether a row existed.
    async fn delete(&self, user_id: &UserId, job_id: &JobId) -> Result<bool, StoreError>;

    /// Most recently played rows for a user, newest first.
    async fn list_recent(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<PlaybackProgress>, StoreError>;
}

#[derive(Default)]
pub struct MemoryProgressStore {
    rows: RwLock<HashMap<(UserId, JobId), PlaybackProgress>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn get(
        &self,
        user_id: &UserId,
        job_id: &JobId,
    ) -> Result<Option<PlaybackProgress>, StoreError> {
        Ok(self
            .rows
            .read()
            .get(&(user_id.clone(), job_id.clone()))
            .cloned())
    }

    async fn upsert(&self, row: PlaybackProgress) -> Result<(), StoreError> {
        self.rows
            .write()
            .insert((row.user_id.clone(), row.job_id.clone()), row);
        Ok(())
    }

    async fn delete(&self, user_id: &UserId, job_id: &JobId) -> Result<bool, StoreError> {
        Ok(self
            .rows
            .write()
            .remove(&(user_id.clone(), job_id.clone()))
            .is_some())
    }

    async fn list_recent(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<PlaybackProgress>, StoreError> {
        let rows = self.rows.read();
        let mut recent: Vec<PlaybackProgress> = rows
            .values()
            .filter(|r| &r.user_id == user_id)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.last_played_at.cmp(&a.last_played_at));
        recent.truncate(limit);
        Ok(recent)
    }
}
