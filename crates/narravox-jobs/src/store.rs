//! Transactional job store contract and in-memory reference
//! implementation.
//!
//! Every mutation is a single-row compare-and-set on the job's version
//! counter; there is no in-process lock spanning workers, so the same
//! contract holds when rows live in a relational database.

use crate::types::{Job, JobStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use narravox_foundation::error::StoreError;
use narravox_foundation::{JobId, UserId};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub user_id: Option<UserId>,
    pub status: Option<JobStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: Job) -> Result<(), StoreError>;

    async fn get(&self, id: &JobId) -> Result<Job, StoreError>;

    /// Compare-and-set update. Fails with [`StoreError::VersionConflict`]
    /// when the stored row's version differs from `job.version`; on
    /// success the stored version is bumped and the stored row returned.
    async fn update(&self, job: Job) -> Result<Job, StoreError>;

    /// Jobs matching the filter, newest first.
    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError>;

    /// Child jobs of a parent, ordered by chapter number.
    async fn children_of(&self, parent_id: &JobId) -> Result<Vec<Job>, StoreError>;
}

#[derive(Default)]
pub struct MemoryJobStore {
    rows: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        self.rows.write().insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Job, StoreError> {
        self.rows
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))
    }

    async fn update(&self, mut job: Job) -> Result<Job, StoreError> {
        let mut rows = self.rows.write();
        let stored = rows
            .get(&job.id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job.id)))?;
        if stored.version != job.version {
            return Err(StoreError::VersionConflict {
                entity: format!("job {}", job.id),
                expected: job.version,
                found: stored.version,
            });
        }
        job.version += 1;
        job.updated_at = Utc::now();
        rows.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let rows = self.rows.read();
        let mut jobs: Vec<Job> = rows
            .values()
            .filter(|j| filter.user_id.as_ref().map_or(true, |u| &j.user_id == u))
            .filter(|j| filter.status.map_or(true, |s| j.status == s))
            .filter(|j| filter.created_after.map_or(true, |t| j.created_at >= t))
            .filter(|j| filter.created_before.map_or(true, |t| j.created_at <= t))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    async fn children_of(&self, parent_id: &JobId) -> Result<Vec<Job>, StoreError> {
        let rows = self.rows.read();
        let mut children: Vec<Job> = rows
            .values()
            .filter(|j| j.parent_job_id.as_ref() == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by_key(|j| j.chapter_number.unwrap_or(u32::MAX));
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentSource, JobConfig};
    use narravox_tts::VoiceSettings;

    fn sample_job(user: &str) -> Job {
        Job::new(
            UserId::from(user),
            "sample",
            JobConfig::TextToAudio {
                source: ContentSource::Inline {
                    text: "hello world".to_string(),
                },
                voice: VoiceSettings::default(),
            },
            None,
        )
    }

    #[tokio::test]
    async fn update_bumps_version() {
        let store = MemoryJobStore::new();
        let job = sample_job("u1");
        store.insert(job.clone()).await.unwrap();

        let mut fetched = store.get(&job.id).await.unwrap();
        fetched.progress = 50.0;
        let stored = store.update(fetched).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.progress, 50.0);
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = MemoryJobStore::new();
        let job = sample_job("u1");
        store.insert(job.clone()).await.unwrap();

        let first = store.get(&job.id).await.unwrap();
        let second = first.clone();
        store.update(first).await.unwrap();

        match store.update(second).await {
            Err(StoreError::VersionConflict { expected, found, .. }) => {
                assert_eq!(expected, 0);
                assert_eq!(found, 1);
            }
            other => panic!("expected version conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_filters_by_user_and_status() {
        let store = MemoryJobStore::new();
        let mine = sample_job("me");
        let theirs = sample_job("them");
        store.insert(mine.clone()).await.unwrap();
        store.insert(theirs).await.unwrap();

        let jobs = store
            .list(&JobFilter {
                user_id: Some(UserId::from("me")),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, mine.id);

        let none = store
            .list(&JobFilter {
                user_id: Some(UserId::from("me")),
                status: Some(JobStatus::Completed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn children_come_back_in_chapter_order() {
        let store = MemoryJobStore::new();
        let parent = sample_job("u1");
        store.insert(parent.clone()).await.unwrap();

        for n in [3u32, 1, 2] {
            let child = Job::new(
                UserId::from("u1"),
                format!("chapter {n}"),
                JobConfig::TextToAudio {
                    source: ContentSource::Inline {
                        text: "chapter text".to_string(),
                    },
                    voice: VoiceSettings::default(),
                },
                Some((parent.id.clone(), n)),
            );
            store.insert(child).await.unwrap();
        }

        let children = store.children_of(&parent.id).await.unwrap();
        let order: Vec<u32> = children.iter().filter_map(|c| c.chapter_number).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }
}
