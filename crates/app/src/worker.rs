//! Queue consumer loop.
//!
//! Workers pull job ids from the task queue, claim them via the
//! PENDING → PROCESSING transition, and route to the pipeline or the
//! book coordinator. Duplicate deliveries (at-least-once queue) fail the
//! claim and are skipped.

use crate::coordinator::BookCoordinator;
use crate::pipeline::TextToAudioPipeline;
use narravox_foundation::error::EngineError;
use narravox_foundation::{CancelToken, JobId};
use narravox_jobs::{JobStateMachine, JobType, TaskQueue};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct JobWorker {
    state: Arc<JobStateMachine>,
    queue: Arc<dyn TaskQueue>,
    pipeline: Arc<TextToAudioPipeline>,
    coordinator: Arc<BookCoordinator>,
    shutdown: CancelToken,
}

impl JobWorker {
    pub fn new(
        state: Arc<JobStateMachine>,
        queue: Arc<dyn TaskQueue>,
        pipeline: Arc<TextToAudioPipeline>,
        coordinator: Arc<BookCoordinator>,
        shutdown: CancelToken,
    ) -> Self {
        Self {
            state,
            queue,
            pipeline,
            coordinator,
            shutdown,
        }
    }

    pub fn spawn(self, worker_index: usize) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(worker = worker_index, "worker started");
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        tracing::info!(worker = worker_index, "worker stopping");
                        break;
                    }
                    job_id = self.queue.dequeue() => {
                        self.process(&job_id).await;
                    }
                }
            }
        })
    }

    async fn process(&self, job_id: &JobId) {
        let job = match self.state.get(job_id).await {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "dequeued unknown job");
                return;
            }
        };

        match self.state.start(job_id).await {
            Ok(_) => {}
            Err(EngineError::InvalidTransition { .. }) => {
                tracing::debug!(job_id = %job_id, status = %job.status, "duplicate delivery, skipping");
                return;
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "failed to claim job");
                return;
            }
        }

        match job.job_type {
            JobType::TextToAudio => {
                match self.pipeline.run(job_id, &self.shutdown).await {
                    Ok(result) => {
                        if let Err(e) = self.state.complete(job_id, result).await {
                            tracing::error!(job_id = %job_id, error = %e, "failed to complete job");
                        }
                    }
                    Err(EngineError::Cancelled) => self.finalize_cancel(job_id).await,
                    Err(e) => {
                        let _ = self.state.fail(job_id, e.to_string(), None).await;
                    }
                }
            }
            JobType::BookProcessing => {
                match self.coordinator.run(job_id, &self.shutdown).await {
                    Ok(outcome) if outcome.cancelled => {
                        let _ = self.state.mark_cancelled(job_id).await;
                    }
                    Ok(outcome) => match outcome.error {
                        // Failed children keep completed siblings' results.
                        Some(message) => {
                            let _ = self
                                .state
                                .fail(job_id, message, Some(outcome.result))
                                .await;
                        }
                        None => {
                            if let Err(e) = self.state.complete(job_id, outcome.result).await {
                                tracing::error!(job_id = %job_id, error = %e, "failed to complete book");
                            }
                        }
                    },
                    Err(EngineError::Cancelled) => self.finalize_cancel(job_id).await,
                    Err(e) => {
                        let _ = self.state.fail(job_id, e.to_string(), None).await;
                    }
                }
            }
        }
    }

    /// A pipeline aborted with `Cancelled` either because the job's flag
    /// was set (finalize to CANCELLED) or because this process is
    /// shutting down (leave the row for another worker).
    async fn finalize_cancel(&self, job_id: &JobId) {
        let requested = self
            .state
            .get(job_id)
            .await
            .map(|j| j.cancel_requested)
            .unwrap_or(false);
        if requested {
            let _ = self.state.mark_cancelled(job_id).await;
        } else {
            tracing::warn!(job_id = %job_id, "job interrupted by shutdown");
        }
    }
}
