//! Fan-out/fan-in coordination for book jobs.
//!
//! One child text-to-audio job per detected chapter, dispatched in
//! chapter order under a per-book concurrency bound. Completion order is
//! unordered; the assembled result is always sorted by chapter number.

use crate::pipeline::TextToAudioPipeline;
use crate::storage::{load_text, ObjectStore};
use narravox_foundation::error::EngineError;
use narravox_foundation::{CancelToken, JobId};
use narravox_jobs::{
    ChapterMeta, ContentSource, Job, JobConfig, JobResultData, JobStateMachine, JobStatus,
    StepStatus,
};
use narravox_splitter::{BookAnalyzer, BoundaryAnalyzer};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const STEP_SPLIT: &str = "split_book";
pub const STEP_CHAPTERS: &str = "chapter_jobs";

/// What the coordinator hands back to the worker: assembled results plus
/// how the run ended. The worker owns the parent's terminal transition,
/// so a failure can still carry the completed chapters with it.
#[derive(Debug, Clone)]
pub struct BookOutcome {
    pub result: JobResultData,
    pub failed_chapters: usize,
    pub cancelled: bool,
    pub error: Option<String>,
}

struct ChapterOutcome {
    number: u32,
    title: String,
    child_id: JobId,
    audio_key: Option<String>,
    duration: Option<f64>,
    error: Option<String>,
}

pub struct BookCoordinator {
    state: Arc<JobStateMachine>,
    objects: Arc<dyn ObjectStore>,
    pipeline: Arc<TextToAudioPipeline>,
    analyzer: Arc<BookAnalyzer>,
    boundary: Option<Arc<dyn BoundaryAnalyzer>>,
    default_max_concurrency: usize,
}

impl BookCoordinator {
    pub fn new(
        state: Arc<JobStateMachine>,
        objects: Arc<dyn ObjectStore>,
        pipeline: Arc<TextToAudioPipeline>,
        boundary: Option<Arc<dyn BoundaryAnalyzer>>,
        default_max_concurrency: usize,
    ) -> Self {
        Self {
            state,
            objects,
            pipeline,
            analyzer: Arc::new(BookAnalyzer::new()),
            boundary,
            default_max_concurrency: default_max_concurrency.max(1),
        }
    }

    /// Split the book, fan out child jobs, and aggregate their results.
    pub async fn run(
        &self,
        job_id: &JobId,
        cancel: &CancelToken,
    ) -> Result<BookOutcome, EngineError> {
        let job = self.state.get(job_id).await?;
        let max_concurrency = match &job.config {
            JobConfig::BookProcessing {
                max_concurrency, ..
            } => max_concurrency.unwrap_or(self.default_max_concurrency).max(1),
            _ => {
                return Err(EngineError::Validation(
                    "coordinator requires a book_processing job".to_string(),
                ))
            }
        };

        self.state.add_step(job_id, STEP_SPLIT).await?;
        self.state.add_step(job_id, STEP_CHAPTERS).await?;

        // Split
        self.checkpoint(job_id, cancel).await?;
        self.state
            .update_step(job_id, STEP_SPLIT, StepStatus::Running, None, None)
            .await?;
        let text = load_text(&self.objects, job.config.source()).await?;
        let chapters = self
            .analyzer
            .split_with_analyzer(&text, self.boundary.as_deref())
            .await;
        tracing::info!(job_id = %job_id, chapters = chapters.len(), "book split into chapters");
        self.state
            .update_step(job_id, STEP_SPLIT, StepStatus::Completed, None, None)
            .await?;

        // Create one child job per chapter, in chapter order.
        self.checkpoint(job_id, cancel).await?;
        self.state
            .update_step(job_id, STEP_CHAPTERS, StepStatus::Running, None, None)
            .await?;
        let voice = job.config.voice().clone();
        let mut children: Vec<(u32, String, JobId)> = Vec::with_capacity(chapters.len());
        for chapter in &chapters {
            let key = format!(
                "jobs/{job_id}/chapters/chapter_{:03}.txt",
                chapter.number
            );
            self.objects.put(&key, chapter.text.clone().into_bytes()).await?;
            let child = self
                .state
                .create(
                    job.user_id.clone(),
                    format!("{} - {}", job.title, chapter.title),
                    JobConfig::TextToAudio {
                        source: ContentSource::Stored { key },
                        voice: voice.clone(),
                    },
                    Some((job_id.clone(), chapter.number)),
                )
                .await?;
            children.push((chapter.number, chapter.title.clone(), child.id));
        }

        let outcome = self
            .dispatch_children(&job, children, max_concurrency, cancel)
            .await;

        let step_status = if outcome.error.is_some() {
            StepStatus::Failed
        } else {
            StepStatus::Completed
        };
        let _ = self
            .state
            .update_step(
                job_id,
                STEP_CHAPTERS,
                step_status,
                None,
                outcome.error.clone(),
            )
            .await;
        Ok(outcome)
    }

    async fn dispatch_children(
        &self,
        parent: &Job,
        children: Vec<(u32, String, JobId)>,
        max_concurrency: usize,
        cancel: &CancelToken,
    ) -> BookOutcome {
        let total = children.len();
        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let mut tasks = JoinSet::new();

        // Tasks are spawned in chapter order and the semaphore is FIFO,
        // so dispatch order follows chapter_number.
        for (number, title, child_id) in children {
            let state = Arc::clone(&self.state);
            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let parent_id = parent.id.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("chapter semaphore closed");

                let parent_cancelled = cancel.is_cancelled()
                    || matches!(state.get(&parent_id).await, Ok(p) if p.cancel_requested);
                if parent_cancelled {
                    let _ = state.cancel(&child_id).await;
                    return ChapterOutcome {
                        number,
                        title,
                        child_id,
                        audio_key: None,
                        duration: None,
                        error: None,
                    };
                }

                if let Err(e) = state.start(&child_id).await {
                    // Already cancelled, or claimed by another delivery.
                    tracing::debug!(child = %child_id, error = %e, "child not started here");
                    let was_cancelled = matches!(
                        state.get(&child_id).await,
                        Ok(c) if c.status == JobStatus::Cancelled
                    );
                    return ChapterOutcome {
                        number,
                        title,
                        child_id,
                        audio_key: None,
                        duration: None,
                        error: (!was_cancelled).then(|| e.to_string()),
                    };
                }

                match pipeline.run(&child_id, &cancel).await {
                    Ok(result) => {
                        let audio_key = result.audio_key.clone();
                        let duration = result.duration_seconds;
                        let _ = state.complete(&child_id, result).await;
                        ChapterOutcome {
                            number,
                            title,
                            child_id,
                            audio_key,
                            duration,
                            error: None,
                        }
                    }
                    Err(EngineError::Cancelled) => {
                        let _ = state.mark_cancelled(&child_id).await;
                        ChapterOutcome {
                            number,
                            title,
                            child_id,
                            audio_key: None,
                            duration: None,
                            error: None,
                        }
                    }
                    Err(e) => {
                        let _ = state.fail(&child_id, e.to_string(), None).await;
                        ChapterOutcome {
                            number,
                            title,
                            child_id,
                            audio_key: None,
                            duration: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            });
        }

        let mut outcomes: Vec<ChapterOutcome> = Vec::with_capacity(total);
        let mut completed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(job_id = %parent.id, error = %e, "chapter task failed");
                    continue;
                }
            };
            if outcome.audio_key.is_some() {
                completed += 1;
                let pct = completed as f64 / total.max(1) as f64 * 100.0;
                let _ = self.state.set_progress(&parent.id, pct).await;
            }
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|o| o.number);

        let cancelled = cancel.is_cancelled()
            || matches!(self.state.get(&parent.id).await, Ok(p) if p.cancel_requested);

        let mut chapters_meta = Vec::with_capacity(outcomes.len());
        let mut playlist = Vec::new();
        let mut child_job_ids = Vec::with_capacity(outcomes.len());
        let mut total_duration = 0.0f64;
        let mut failures: Vec<String> = Vec::new();

        for outcome in &outcomes {
            if let Some(key) = &outcome.audio_key {
                playlist.push(key.clone());
                total_duration += outcome.duration.unwrap_or(0.0);
            }
            if let Some(error) = &outcome.error {
                failures.push(format!("chapter {}: {error}", outcome.number));
            }
            child_job_ids.push(outcome.child_id.clone());
            chapters_meta.push(ChapterMeta {
                chapter_number: outcome.number,
                title: outcome.title.clone(),
                job_id: outcome.child_id.clone(),
                audio_key: outcome.audio_key.clone(),
                duration_seconds: outcome.duration,
                error: outcome.error.clone(),
            });
        }

        let error = if failures.is_empty() {
            None
        } else {
            Some(format!(
                "{} of {} chapters failed ({})",
                failures.len(),
                total,
                failures.join("; ")
            ))
        };

        BookOutcome {
            result: JobResultData {
                duration_seconds: Some(total_duration),
                file_size_bytes: None,
                audio_key: None,
                chapters: chapters_meta,
                playlist,
                child_job_ids,
            },
            failed_chapters: failures.len(),
            cancelled,
            error,
        }
    }

    async fn checkpoint(&self, job_id: &JobId, cancel: &CancelToken) -> Result<(), EngineError> {
        cancel.checkpoint()?;
        let job = self.state.get(job_id).await?;
        if job.cancel_requested {
            tracing::info!(job_id = %job_id, "cancellation observed before fan-out");
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }
}
