//! Job lifecycle state machine.
//!
//! Owns every Job/JobStep mutation. All writes go through a versioned
//! compare-and-set loop against the store, so two workers finishing
//! sibling steps concurrently cannot overwrite each other's progress.

use crate::store::JobStore;
use crate::types::{Job, JobResultData, JobStatus, JobStep, JobType, StepStatus};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use narravox_foundation::error::{EngineError, StoreError};
use narravox_foundation::{JobId, UserId};
use std::sync::Arc;

/// Lifecycle notifications, broadcast to subscribers as transitions
/// commit.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Transition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    CancellationRequested {
        job_id: JobId,
    },
    Progress {
        job_id: JobId,
        progress: f64,
    },
}

/// Outcome of a mutation closure: write the row back, or leave it
/// untouched (idempotent no-op).
enum Mutation {
    Write(Vec<JobEvent>),
    Skip,
}

const MAX_CAS_RETRIES: usize = 16;

pub struct JobStateMachine {
    store: Arc<dyn JobStore>,
    event_tx: Sender<JobEvent>,
    event_rx: Receiver<JobEvent>,
}

impl JobStateMachine {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        Self {
            store,
            event_tx,
            event_rx,
        }
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    /// Subscribe to lifecycle events (multiple subscribers supported).
    pub fn subscribe(&self) -> Receiver<JobEvent> {
        self.event_rx.clone()
    }

    fn valid_transition(from: JobStatus, to: JobStatus) -> bool {
        matches!(
            (from, to),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Cancelled)
        )
    }

    /// Validate the config and persist a new PENDING job with no steps.
    pub async fn create(
        &self,
        user_id: UserId,
        title: impl Into<String>,
        config: crate::types::JobConfig,
        parent: Option<(JobId, u32)>,
    ) -> Result<Job, EngineError> {
        config.validate()?;
        let job = Job::new(user_id, title, config, parent);
        self.store.insert(job.clone()).await?;
        tracing::info!(job_id = %job.id, job_type = %job.job_type, "job created");
        Ok(job)
    }

    pub async fn get(&self, id: &JobId) -> Result<Job, EngineError> {
        Ok(self.store.get(id).await?)
    }

    /// PENDING → PROCESSING. Fails with `InvalidTransition` otherwise,
    /// which is how duplicate queue deliveries are detected.
    pub async fn start(&self, id: &JobId) -> Result<Job, EngineError> {
        self.modify(id, |job| {
            if job.status != JobStatus::Pending {
                return Err(EngineError::InvalidTransition {
                    from: job.status.to_string(),
                    to: JobStatus::Processing.to_string(),
                });
            }
            job.status = JobStatus::Processing;
            job.started_at = Some(Utc::now());
            Ok(Mutation::Write(vec![JobEvent::Transition {
                job_id: job.id.clone(),
                from: JobStatus::Pending,
                to: JobStatus::Processing,
            }]))
        })
        .await
    }

    /// PROCESSING → COMPLETED. No-op on an already-terminal job.
    pub async fn complete(&self, id: &JobId, result: JobResultData) -> Result<Job, EngineError> {
        self.modify(id, |job| {
            if job.status.is_terminal() {
                return Ok(Mutation::Skip);
            }
            Self::require(job.status, JobStatus::Completed)?;
            job.status = JobStatus::Completed;
            job.progress = 100.0;
            job.completed_at = Some(Utc::now());
            job.result_data = result.clone();
            job.error_message = None;
            Ok(Mutation::Write(vec![JobEvent::Transition {
                job_id: job.id.clone(),
                from: JobStatus::Processing,
                to: JobStatus::Completed,
            }]))
        })
        .await
    }

    /// PROCESSING → FAILED. No-op on an already-terminal job. `partial`
    /// preserves any results produced before the failure (completed
    /// chapters of a book stay playable).
    pub async fn fail(
        &self,
        id: &JobId,
        error: impl Into<String>,
        partial: Option<JobResultData>,
    ) -> Result<Job, EngineError> {
        let error = error.into();
        self.modify(id, move |job| {
            if job.status.is_terminal() {
                return Ok(Mutation::Skip);
            }
            Self::require(job.status, JobStatus::Failed)?;
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
            job.error_message = Some(error.clone());
            if let Some(result) = &partial {
                job.result_data = result.clone();
            }
            Ok(Mutation::Write(vec![JobEvent::Transition {
                job_id: job.id.clone(),
                from: JobStatus::Processing,
                to: JobStatus::Failed,
            }]))
        })
        .await
    }

    /// Request cancellation. A PENDING job is cancelled immediately; a
    /// PROCESSING job gets its flag set and the executing worker finishes
    /// cooperatively. Terminal jobs are left untouched.
    pub async fn cancel(&self, id: &JobId) -> Result<Job, EngineError> {
        self.modify(id, |job| match job.status {
            JobStatus::Pending => {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now());
                Ok(Mutation::Write(vec![JobEvent::Transition {
                    job_id: job.id.clone(),
                    from: JobStatus::Pending,
                    to: JobStatus::Cancelled,
                }]))
            }
            JobStatus::Processing => {
                if job.cancel_requested {
                    return Ok(Mutation::Skip);
                }
                job.cancel_requested = true;
                Ok(Mutation::Write(vec![JobEvent::CancellationRequested {
                    job_id: job.id.clone(),
                }]))
            }
            _ => Ok(Mutation::Skip),
        })
        .await
    }

    /// Terminal CANCELLED transition, invoked by the worker that observed
    /// the cancellation flag at a step boundary.
    pub async fn mark_cancelled(&self, id: &JobId) -> Result<Job, EngineError> {
        self.modify(id, |job| {
            if job.status.is_terminal() {
                return Ok(Mutation::Skip);
            }
            let from = job.status;
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(Utc::now());
            Ok(Mutation::Write(vec![JobEvent::Transition {
                job_id: job.id.clone(),
                from,
                to: JobStatus::Cancelled,
            }]))
        })
        .await
    }

    /// Append a PENDING step; step order stays contiguous from 1.
    pub async fn add_step(&self, id: &JobId, step_name: &str) -> Result<Job, EngineError> {
        self.modify(id, |job| {
            job.steps.push(JobStep {
                step_name: step_name.to_string(),
                step_order: job.steps.len() as u32 + 1,
                status: StepStatus::Pending,
                progress: 0.0,
                error_message: None,
                started_at: None,
                completed_at: None,
            });
            Ok(Mutation::Write(Vec::new()))
        })
        .await
    }

    /// Update one step and recompute the job's aggregate progress as the
    /// mean of step progress. Container (book) jobs are excluded: their
    /// progress is the completed-child ratio, owned by the coordinator.
    pub async fn update_step(
        &self,
        id: &JobId,
        step_name: &str,
        status: StepStatus,
        progress: Option<f64>,
        error: Option<String>,
    ) -> Result<Job, EngineError> {
        self.modify(id, |job| {
            let step = job
                .steps
                .iter_mut()
                .find(|s| s.step_name == step_name)
                .ok_or_else(|| {
                    EngineError::Store(StoreError::NotFound(format!(
                        "step {step_name} of job {id}"
                    )))
                })?;
            step.status = status;
            step.progress = match (status, progress) {
                (StepStatus::Completed, _) => 100.0,
                (_, Some(p)) => p.clamp(0.0, 100.0),
                (_, None) => step.progress,
            };
            match status {
                StepStatus::Running if step.started_at.is_none() => {
                    step.started_at = Some(Utc::now());
                }
                StepStatus::Completed | StepStatus::Failed => {
                    step.completed_at = Some(Utc::now());
                }
                _ => {}
            }
            step.error_message = error.clone();

            let mut events = Vec::new();
            if job.job_type != JobType::BookProcessing && !job.steps.is_empty() {
                let mean =
                    job.steps.iter().map(|s| s.progress).sum::<f64>() / job.steps.len() as f64;
                job.progress = mean.clamp(0.0, 100.0);
                events.push(JobEvent::Progress {
                    job_id: job.id.clone(),
                    progress: job.progress,
                });
            }
            Ok(Mutation::Write(events))
        })
        .await
    }

    /// Directly set aggregate progress; used for container jobs whose
    /// progress is the completed-child ratio.
    pub async fn set_progress(&self, id: &JobId, progress: f64) -> Result<Job, EngineError> {
        self.modify(id, |job| {
            job.progress = progress.clamp(0.0, 100.0);
            Ok(Mutation::Write(vec![JobEvent::Progress {
                job_id: job.id.clone(),
                progress: job.progress,
            }]))
        })
        .await
    }

    fn require(from: JobStatus, to: JobStatus) -> Result<(), EngineError> {
        if Self::valid_transition(from, to) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Read-modify-write with compare-and-set retry. Events are emitted
    /// only after a write commits.
    async fn modify<F>(&self, id: &JobId, mut f: F) -> Result<Job, EngineError>
    where
        F: FnMut(&mut Job) -> Result<Mutation, EngineError>,
    {
        let mut last_conflict = None;
        for _ in 0..MAX_CAS_RETRIES {
            let mut job = self.store.get(id).await?;
            match f(&mut job)? {
                Mutation::Skip => return Ok(job),
                Mutation::Write(events) => match self.store.update(job).await {
                    Ok(stored) => {
                        for event in events {
                            let _ = self.event_tx.send(event);
                        }
                        return Ok(stored);
                    }
                    Err(conflict @ StoreError::VersionConflict { .. }) => {
                        tracing::debug!(job_id = %id, "version conflict, retrying");
                        last_conflict = Some(conflict);
                    }
                    Err(e) => return Err(e.into()),
                },
            }
        }
        Err(last_conflict
            .unwrap_or_else(|| StoreError::NotFound(format!("job {id}")))
            .into())
    }
}
