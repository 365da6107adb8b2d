//! Engine facade: the plain-data interface the API layer calls.

use crate::coordinator::BookCoordinator;
use crate::pipeline::{PipelineConfig, TextToAudioPipeline};
use crate::storage::{MemoryObjectStore, ObjectStore, PresignedUrl};
use crate::worker::JobWorker;
use crate::EngineSettings;
use crossbeam_channel::Receiver;
use narravox_foundation::error::EngineError;
use narravox_foundation::{CancelToken, JobId, UserId};
use narravox_jobs::{
    ChapterMeta, Job, JobConfig, JobEvent, JobFilter, JobStateMachine, JobStore, MemoryJobStore,
    MemoryTaskQueue, TaskQueue,
};
use narravox_playback::{
    MemoryProgressStore, PlaybackProgress, PlaybackTracker, ProgressStore, ResumeInfo,
};
use narravox_splitter::BoundaryAnalyzer;
use narravox_tts::Synthesizer;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Options for starting the engine. Collaborators default to the
/// in-memory implementations when not supplied.
pub struct EngineOptions {
    pub settings: EngineSettings,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub boundary_analyzer: Option<Arc<dyn BoundaryAnalyzer>>,
    pub job_store: Option<Arc<dyn JobStore>>,
    pub object_store: Option<Arc<dyn ObjectStore>>,
    pub progress_store: Option<Arc<dyn ProgressStore>>,
    pub queue: Option<Arc<dyn TaskQueue>>,
}

impl EngineOptions {
    pub fn new(settings: EngineSettings, synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            settings,
            synthesizer,
            boundary_analyzer: None,
            job_store: None,
            object_store: None,
            progress_store: None,
            queue: None,
        }
    }
}

/// A job with its children resolved.
#[derive(Debug, Clone)]
pub struct JobView {
    pub job: Job,
    pub children: Vec<Job>,
}

/// Aggregated chapter results for a book job.
#[derive(Debug, Clone)]
pub struct BookChapters {
    pub total_chapters: usize,
    pub completed_chapters: usize,
    pub failed_chapters: usize,
    pub total_duration_seconds: f64,
    pub chapters: Vec<ChapterMeta>,
}

/// Streaming URL plus the caller's resume state.
#[derive(Debug, Clone)]
pub struct StreamingInfo {
    pub url: PresignedUrl,
    pub resume: ResumeInfo,
}

pub struct Engine {
    state: Arc<JobStateMachine>,
    store: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    queue: Arc<dyn TaskQueue>,
    tracker: PlaybackTracker,
    settings: EngineSettings,
    shutdown: CancelToken,
    workers: Vec<JoinHandle<()>>,
}

/// Start the engine: build the component graph and spawn the worker
/// pool.
pub async fn start(opts: EngineOptions) -> Engine {
    let settings = opts.settings;
    let store: Arc<dyn JobStore> = opts
        .job_store
        .unwrap_or_else(|| Arc::new(MemoryJobStore::new()));
    let objects: Arc<dyn ObjectStore> = opts
        .object_store
        .unwrap_or_else(|| Arc::new(MemoryObjectStore::new()));
    let progress: Arc<dyn ProgressStore> = opts
        .progress_store
        .unwrap_or_else(|| Arc::new(MemoryProgressStore::new()));
    let queue: Arc<dyn TaskQueue> = opts
        .queue
        .unwrap_or_else(|| Arc::new(MemoryTaskQueue::new()));

    let state = Arc::new(JobStateMachine::new(Arc::clone(&store)));
    let pipeline = Arc::new(TextToAudioPipeline::new(
        Arc::clone(&state),
        Arc::clone(&objects),
        Arc::clone(&opts.synthesizer),
        PipelineConfig {
            retry: settings.retry_policy(),
            fanout: settings.fanout(),
        },
    ));
    let coordinator = Arc::new(BookCoordinator::new(
        Arc::clone(&state),
        Arc::clone(&objects),
        Arc::clone(&pipeline),
        opts.boundary_analyzer,
        settings.book_max_concurrency,
    ));
    let tracker = PlaybackTracker::new(Arc::clone(&store), Arc::clone(&progress))
        .with_threshold(settings.completion_threshold);

    let shutdown = CancelToken::new();
    let workers = (0..settings.workers.max(1))
        .map(|i| {
            JobWorker::new(
                Arc::clone(&state),
                Arc::clone(&queue),
                Arc::clone(&pipeline),
                Arc::clone(&coordinator),
                shutdown.clone(),
            )
            .spawn(i)
        })
        .collect();

    tracing::info!(workers = settings.workers, "engine started");
    Engine {
        state,
        store,
        objects,
        queue,
        tracker,
        settings,
        shutdown,
        workers,
    }
}

impl Engine {
    /// Validate, persist, and enqueue a new job.
    pub async fn create_job(
        &self,
        user_id: UserId,
        title: impl Into<String>,
        config: JobConfig,
    ) -> Result<Job, EngineError> {
        let job = self.state.create(user_id, title, config, None).await?;
        self.queue.enqueue(job.id.clone()).await;
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &JobId) -> Result<JobView, EngineError> {
        let job = self.state.get(job_id).await?;
        let children = self.store.children_of(job_id).await?;
        Ok(JobView { job, children })
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, EngineError> {
        Ok(self.store.list(filter).await?)
    }

    /// Cancel a job and cascade to its non-terminal children. PENDING
    /// jobs cancel immediately; PROCESSING ones stop cooperatively.
    pub async fn cancel_job(&self, job_id: &JobId) -> Result<Job, EngineError> {
        let job = self.state.cancel(job_id).await?;
        for child in self.store.children_of(job_id).await? {
            if !child.status.is_terminal() {
                let _ = self.state.cancel(&child.id).await;
            }
        }
        Ok(job)
    }

    pub async fn update_progress(
        &self,
        user_id: &UserId,
        job_id: &JobId,
        position_seconds: f64,
        chapter_id: Option<JobId>,
    ) -> Result<PlaybackProgress, EngineError> {
        self.tracker
            .update(user_id, job_id, position_seconds, chapter_id)
            .await
    }

    pub async fn get_progress(
        &self,
        user_id: &UserId,
        job_id: &JobId,
    ) -> Result<Option<PlaybackProgress>, EngineError> {
        self.tracker.get(user_id, job_id).await
    }

    pub async fn reset_progress(
        &self,
        user_id: &UserId,
        job_id: &JobId,
    ) -> Result<bool, EngineError> {
        self.tracker.reset(user_id, job_id).await
    }

    pub async fn list_recent_progress(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<PlaybackProgress>, EngineError> {
        self.tracker.list_recent(user_id, limit).await
    }

    pub async fn resume_info(
        &self,
        user_id: &UserId,
        job_id: &JobId,
    ) -> Result<ResumeInfo, EngineError> {
        self.tracker.resume_info(user_id, job_id).await
    }

    /// Chapter roll-up for a book job, including failed chapters.
    pub async fn book_chapters(&self, job_id: &JobId) -> Result<BookChapters, EngineError> {
        let job = self.state.get(job_id).await?;
        let chapters = job.result_data.chapters;
        let completed = chapters.iter().filter(|c| c.is_completed()).count();
        let failed = chapters.iter().filter(|c| c.error.is_some()).count();
        let total_duration = chapters
            .iter()
            .filter_map(|c| c.duration_seconds)
            .sum::<f64>();
        Ok(BookChapters {
            total_chapters: chapters.len(),
            completed_chapters: completed,
            failed_chapters: failed,
            total_duration_seconds: total_duration,
            chapters,
        })
    }

    /// Presigned streaming URL for a job's audio plus the caller's
    /// resume state.
    pub async fn streaming_url(
        &self,
        user_id: &UserId,
        job_id: &JobId,
    ) -> Result<StreamingInfo, EngineError> {
        let job = self.state.get(job_id).await?;
        let key = job.result_data.audio_key.ok_or_else(|| {
            EngineError::Validation(format!("job {job_id} has no stored audio"))
        })?;
        let url = self
            .objects
            .get_presigned_url(&key, self.settings.presign_ttl())
            .await?;
        let resume = self.tracker.resume_info(user_id, job_id).await?;
        Ok(StreamingInfo { url, resume })
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> Receiver<JobEvent> {
        self.state.subscribe()
    }

    /// Poll until the job reaches a terminal status.
    pub async fn wait_for_terminal(
        &self,
        job_id: &JobId,
        timeout: Duration,
    ) -> Result<Job, EngineError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self.state.get(job_id).await?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::Validation(format!(
                    "job {job_id} still {} after {timeout:?}",
                    job.status
                )));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stop the worker pool and wait for shutdown.
    pub async fn shutdown(self) {
        tracing::info!("shutting down engine");
        self.shutdown.request();
        for handle in self.workers {
            let _ = handle.await;
        }
        tracing::info!("engine shutdown complete");
    }
}
