//! Playback progress tracker.

use crate::store::ProgressStore;
use chrono::{DateTime, Utc};
use narravox_foundation::error::EngineError;
use narravox_foundation::{JobId, UserId};
use narravox_jobs::JobStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fraction of the audio after which playback counts as finished.
pub const COMPLETION_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackProgress {
    pub user_id: UserId,
    pub job_id: JobId,
    pub position_seconds: f64,
    /// Snapshot of the job's audio duration at the last update.
    pub duration_seconds: f64,
    /// position / duration, in [0, 1].
    pub percentage_complete: f64,
    /// Chapter (child job) currently playing, for book jobs.
    pub current_chapter_id: Option<JobId>,
    pub is_completed: bool,
    pub last_played_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Resume state computed for the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeInfo {
    pub has_progress: bool,
    pub resume_position: f64,
    pub percentage_complete: f64,
    pub current_chapter_id: Option<JobId>,
    pub last_played_at: Option<DateTime<Utc>>,
}

impl ResumeInfo {
    fn none() -> Self {
        Self {
            has_progress: false,
            resume_position: 0.0,
            percentage_complete: 0.0,
            current_chapter_id: None,
            last_played_at: None,
        }
    }
}

pub struct PlaybackTracker {
    jobs: Arc<dyn JobStore>,
    progress: Arc<dyn ProgressStore>,
    completion_threshold: f64,
}

impl PlaybackTracker {
    pub fn new(jobs: Arc<dyn JobStore>, progress: Arc<dyn ProgressStore>) -> Self {
        Self {
            jobs,
            progress,
            completion_threshold: COMPLETION_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.completion_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub async fn get(
        &self,
        user_id: &UserId,
        job_id: &JobId,
    ) -> Result<Option<PlaybackProgress>, EngineError> {
        Ok(self.progress.get(user_id, job_id).await?)
    }

    /// Upsert the row for (user, job).
    ///
    /// Position is clamped into [0, duration]; duration is re-read from
    /// the owning job on every call, so a regenerated job's new duration
    /// replaces a stale snapshot. Repeating an identical call changes
    /// nothing but `last_played_at`.
    pub async fn update(
        &self,
        user_id: &UserId,
        job_id: &JobId,
        position_seconds: f64,
        chapter_id: Option<JobId>,
    ) -> Result<PlaybackProgress, EngineError> {
        let job = self.jobs.get(job_id).await?;
        let duration = job
            .result_data
            .duration_seconds
            .filter(|d| *d > 0.0)
            .ok_or_else(|| {
                EngineError::Validation(format!("job {job_id} has no audio duration yet"))
            })?;

        if let Some(chapter) = &chapter_id {
            let known = job
                .result_data
                .chapters
                .iter()
                .any(|c| &c.job_id == chapter);
            if !known {
                return Err(EngineError::Validation(format!(
                    "chapter {chapter} is not part of job {job_id}"
                )));
            }
        }

        let position = position_seconds.clamp(0.0, duration);
        let percentage = (position / duration).clamp(0.0, 1.0);
        let now = Utc::now();
        let existing = self.progress.get(user_id, job_id).await?;

        let row = PlaybackProgress {
            user_id: user_id.clone(),
            job_id: job_id.clone(),
            position_seconds: position,
            duration_seconds: duration,
            percentage_complete: percentage,
            current_chapter_id: chapter_id
                .or_else(|| existing.as_ref().and_then(|e| e.current_chapter_id.clone())),
            is_completed: percentage >= self.completion_threshold,
            last_played_at: now,
            created_at: existing.map(|e| e.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.progress.upsert(row.clone()).await?;
        tracing::debug!(
            user_id = %user_id,
            job_id = %job_id,
            position,
            percentage,
            "playback progress updated"
        );
        Ok(row)
    }

    /// Delete the row. Returns whether one existed.
    pub async fn reset(&self, user_id: &UserId, job_id: &JobId) -> Result<bool, EngineError> {
        Ok(self.progress.delete(user_id, job_id).await?)
    }

    pub async fn list_recent(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<PlaybackProgress>, EngineError> {
        Ok(self.progress.list_recent(user_id, limit).await?)
    }

    pub async fn resume_info(
        &self,
        user_id: &UserId,
        job_id: &JobId,
    ) -> Result<ResumeInfo, EngineError> {
        Ok(match self.progress.get(user_id, job_id).await? {
            None => ResumeInfo::none(),
            Some(row) => ResumeInfo {
                has_progress: true,
                resume_position: row.position_seconds,
                percentage_complete: row.percentage_complete,
                current_chapter_id: row.current_chapter_id,
                last_played_at: Some(row.last_played_at),
            },
        })
    }
}
