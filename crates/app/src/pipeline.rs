//! The chunk → synthesize → concatenate → persist pipeline for a single
//! text-to-audio job.
//!
//! Each stage is a JobStep; cancellation (engine shutdown or the job's
//! persisted flag) is observed at step boundaries and between chunks,
//! so an in-flight provider call always finishes.

use crate::audio::encode_wav;
use crate::storage::{load_text, ObjectStore};
use narravox_foundation::error::EngineError;
use narravox_foundation::{CancelToken, JobId};
use narravox_jobs::{JobResultData, JobStateMachine, StepStatus};
use narravox_tts::{
    concatenate, synthesize_chunks, ChunkProgress, FanoutOptions, RetryPolicy, Synthesizer,
    TextChunker,
};
use std::sync::Arc;
use tokio::sync::mpsc;

pub const STEP_CHUNK: &str = "chunk";
pub const STEP_SYNTHESIZE: &str = "synthesize";
pub const STEP_CONCATENATE: &str = "concatenate";
pub const STEP_PERSIST: &str = "persist";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub retry: RetryPolicy,
    pub fanout: FanoutOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            fanout: FanoutOptions::default(),
        }
    }
}

pub struct TextToAudioPipeline {
    state: Arc<JobStateMachine>,
    objects: Arc<dyn ObjectStore>,
    synth: Arc<dyn Synthesizer>,
    config: PipelineConfig,
}

impl TextToAudioPipeline {
    pub fn new(
        state: Arc<JobStateMachine>,
        objects: Arc<dyn ObjectStore>,
        synth: Arc<dyn Synthesizer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            state,
            objects,
            synth,
            config,
        }
    }

    /// Run all four steps for a PROCESSING job and return its result
    /// metadata. The caller owns the terminal transition.
    pub async fn run(
        &self,
        job_id: &JobId,
        cancel: &CancelToken,
    ) -> Result<JobResultData, EngineError> {
        let job = self.state.get(job_id).await?;
        for step in [STEP_CHUNK, STEP_SYNTHESIZE, STEP_CONCATENATE, STEP_PERSIST] {
            self.state.add_step(job_id, step).await?;
        }

        // 1. Chunk
        self.checkpoint(job_id, cancel).await?;
        self.begin(job_id, STEP_CHUNK).await?;
        let text = load_text(&self.objects, job.config.source()).await?;
        let chunker = TextChunker::new(self.synth.max_chars());
        let chunks = chunker.chunk(&text);
        if chunks.is_empty() {
            let err = EngineError::Validation("no synthesizable text in job input".to_string());
            self.fail_step(job_id, STEP_CHUNK, &err).await;
            return Err(err);
        }
        tracing::info!(job_id = %job_id, chunks = chunks.len(), "input chunked");
        self.finish(job_id, STEP_CHUNK).await?;

        // 2. Synthesize
        self.checkpoint(job_id, cancel).await?;
        self.begin(job_id, STEP_SYNTHESIZE).await?;
        let (progress_tx, progress_rx) = mpsc::unbounded_channel::<ChunkProgress>();
        let forwarder = self.spawn_progress_forwarder(job_id.clone(), progress_rx);
        // The fan-out checks its token between chunks; feed it from both
        // the shutdown token and the job's persisted cancel flag so a
        // cancel from another process stops a long chunk list early.
        let chunk_cancel = CancelToken::new();
        let watcher = self.spawn_cancel_watcher(job_id.clone(), cancel.clone(), chunk_cancel.clone());
        let clips = synthesize_chunks(
            Arc::clone(&self.synth),
            chunks,
            job.config.voice(),
            &self.config.retry,
            &self.config.fanout,
            &chunk_cancel,
            Some(progress_tx),
        )
        .await;
        watcher.abort();
        let _ = forwarder.await;
        let clips = match clips {
            Ok(clips) => clips,
            Err(err) => {
                if !matches!(err, EngineError::Cancelled) {
                    self.fail_step(job_id, STEP_SYNTHESIZE, &err).await;
                }
                return Err(err);
            }
        };
        self.finish(job_id, STEP_SYNTHESIZE).await?;

        // 3. Concatenate
        self.checkpoint(job_id, cancel).await?;
        self.begin(job_id, STEP_CONCATENATE).await?;
        let audio = match concatenate(&clips) {
            Ok(audio) => audio,
            Err(err) => {
                self.fail_step(job_id, STEP_CONCATENATE, &err).await;
                return Err(err);
            }
        };
        self.finish(job_id, STEP_CONCATENATE).await?;

        // 4. Persist
        self.checkpoint(job_id, cancel).await?;
        self.begin(job_id, STEP_PERSIST).await?;
        let result = match self.persist(job_id, &audio).await {
            Ok(result) => result,
            Err(err) => {
                self.fail_step(job_id, STEP_PERSIST, &err).await;
                return Err(err);
            }
        };
        self.finish(job_id, STEP_PERSIST).await?;

        tracing::info!(
            job_id = %job_id,
            duration = result.duration_seconds,
            bytes = result.file_size_bytes,
            "audio pipeline finished"
        );
        Ok(result)
    }

    async fn persist(
        &self,
        job_id: &JobId,
        audio: &narravox_tts::AudioClip,
    ) -> Result<JobResultData, EngineError> {
        let bytes = encode_wav(audio)?;
        let size = bytes.len() as u64;
        let key = format!("jobs/{job_id}/audio.wav");
        self.objects.put(&key, bytes).await?;
        Ok(JobResultData {
            duration_seconds: Some(audio.duration_seconds()),
            file_size_bytes: Some(size),
            audio_key: Some(key),
            ..Default::default()
        })
    }

    /// Trip `chunk_cancel` when either the engine shuts down or the
    /// job's persisted cancel flag appears.
    fn spawn_cancel_watcher(
        &self,
        job_id: JobId,
        shutdown: CancelToken,
        chunk_cancel: CancelToken,
    ) -> tokio::task::JoinHandle<()> {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            loop {
                if shutdown.is_cancelled() {
                    chunk_cancel.request();
                    return;
                }
                if matches!(state.get(&job_id).await, Ok(j) if j.cancel_requested) {
                    chunk_cancel.request();
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        })
    }

    fn spawn_progress_forwarder(
        &self,
        job_id: JobId,
        mut rx: mpsc::UnboundedReceiver<ChunkProgress>,
    ) -> tokio::task::JoinHandle<()> {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            while let Some(p) = rx.recv().await {
                let pct = p.completed as f64 / p.total.max(1) as f64 * 100.0;
                if let Err(e) = state
                    .update_step(&job_id, STEP_SYNTHESIZE, StepStatus::Running, Some(pct), None)
                    .await
                {
                    tracing::debug!(job_id = %job_id, error = %e, "progress update dropped");
                }
            }
        })
    }

    /// Step-boundary cancellation check: engine shutdown token plus the
    /// job's persisted flag (set by cancel requests from any process).
    async fn checkpoint(&self, job_id: &JobId, cancel: &CancelToken) -> Result<(), EngineError> {
        cancel.checkpoint()?;
        let job = self.state.get(job_id).await?;
        if job.cancel_requested {
            tracing::info!(job_id = %job_id, "cancellation observed at step boundary");
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    async fn begin(&self, job_id: &JobId, step: &str) -> Result<(), EngineError> {
        self.state
            .update_step(job_id, step, StepStatus::Running, None, None)
            .await?;
        Ok(())
    }

    async fn finish(&self, job_id: &JobId, step: &str) -> Result<(), EngineError> {
        self.state
            .update_step(job_id, step, StepStatus::Completed, None, None)
            .await?;
        Ok(())
    }

    async fn fail_step(&self, job_id: &JobId, step: &str, err: &EngineError) {
        if let Err(e) = self
            .state
            .update_step(
                job_id,
                step,
                StepStatus::Failed,
                None,
                Some(err.to_string()),
            )
            .await
        {
            tracing::warn!(job_id = %job_id, step, error = %e, "failed to record step failure");
        }
    }
}
