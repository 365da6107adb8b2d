//! Job and step row types.

use chrono::{DateTime, Utc};
use narravox_foundation::error::EngineError;
use narravox_foundation::{JobId, UserId};
use narravox_tts::VoiceSettings;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    TextToAudio,
    BookProcessing,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::TextToAudio => f.write_str("text_to_audio"),
            JobType::BookProcessing => f.write_str("book_processing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Where a job's input text comes from. Exactly one source by
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentSource {
    Inline { text: String },
    Stored { key: String },
}

impl ContentSource {
    fn validate(&self) -> Result<(), EngineError> {
        match self {
            ContentSource::Inline { text } if text.trim().is_empty() => Err(
                EngineError::Validation("inline content must not be empty".to_string()),
            ),
            ContentSource::Stored { key } if key.trim().is_empty() => Err(
                EngineError::Validation("content key must not be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// Per-type job configuration, tagged by job type so each variant only
/// carries its valid fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job_type", rename_all = "snake_case")]
pub enum JobConfig {
    TextToAudio {
        source: ContentSource,
        voice: VoiceSettings,
    },
    BookProcessing {
        source: ContentSource,
        voice: VoiceSettings,
        /// Per-book fan-out bound; engine default when absent.
        max_concurrency: Option<usize>,
    },
}

impl JobConfig {
    pub fn job_type(&self) -> JobType {
        match self {
            JobConfig::TextToAudio { .. } => JobType::TextToAudio,
            JobConfig::BookProcessing { .. } => JobType::BookProcessing,
        }
    }

    pub fn source(&self) -> &ContentSource {
        match self {
            JobConfig::TextToAudio { source, .. } => source,
            JobConfig::BookProcessing { source, .. } => source,
        }
    }

    pub fn voice(&self) -> &VoiceSettings {
        match self {
            JobConfig::TextToAudio { voice, .. } => voice,
            JobConfig::BookProcessing { voice, .. } => voice,
        }
    }

    /// Checked once at job creation; a config that fails here is never
    /// retried.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.source().validate()?;
        if let JobConfig::BookProcessing {
            max_concurrency: Some(0),
            ..
        } = self
        {
            return Err(EngineError::Validation(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result metadata for one chapter of a book job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterMeta {
    pub chapter_number: u32,
    pub title: String,
    /// The child job that produced (or failed to produce) this chapter.
    pub job_id: JobId,
    pub audio_key: Option<String>,
    pub duration_seconds: Option<f64>,
    pub error: Option<String>,
}

impl ChapterMeta {
    pub fn is_completed(&self) -> bool {
        self.audio_key.is_some() && self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JobResultData {
    pub duration_seconds: Option<f64>,
    pub file_size_bytes: Option<u64>,
    pub audio_key: Option<String>,
    /// For book jobs: chapter results ordered by `chapter_number`,
    /// regardless of child completion order.
    pub chapters: Vec<ChapterMeta>,
    /// Audio keys of completed chapters, in playback order.
    pub playlist: Vec<String>,
    pub child_job_ids: Vec<JobId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStep {
    pub step_name: String,
    /// 1-based, contiguous, strictly increasing within the job.
    pub step_order: u32,
    pub status: StepStatus,
    pub progress: f64,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub user_id: UserId,
    pub title: String,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Aggregate progress in [0, 100].
    pub progress: f64,
    pub parent_job_id: Option<JobId>,
    /// Position within the parent book, for child chapter jobs.
    pub chapter_number: Option<u32>,
    pub config: JobConfig,
    pub result_data: JobResultData,
    pub error_message: Option<String>,
    /// Cooperative cancellation flag, observed by workers at step
    /// boundaries.
    pub cancel_requested: bool,
    pub steps: Vec<JobStep>,
    /// Optimistic concurrency version, bumped by every store update.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        user_id: UserId,
        title: impl Into<String>,
        config: JobConfig,
        parent: Option<(JobId, u32)>,
    ) -> Self {
        let now = Utc::now();
        let (parent_job_id, chapter_number) = match parent {
            Some((id, n)) => (Some(id), Some(n)),
            None => (None, None),
        };
        Self {
            id: JobId::generate(),
            user_id,
            title: title.into(),
            job_type: config.job_type(),
            status: JobStatus::Pending,
            progress: 0.0,
            parent_job_id,
            chapter_number,
            config,
            result_data: JobResultData::default(),
            error_message: None,
            cancel_requested: false,
            steps: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn step(&self, name: &str) -> Option<&JobStep> {
        self.steps.iter().find(|s| s.step_name == name)
    }
}
