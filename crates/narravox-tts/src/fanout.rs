//! Bounded-concurrency chunk synthesis.
//!
//! Chunks are dispatched in text order under a semaphore and reassembled
//! strictly by chunk index, so parallel completion order can never
//! reorder the audio. Cancellation is observed between chunks: a chunk
//! whose provider call is already in flight finishes normally.

use crate::retry::{synthesize_with_retry, RetryPolicy};
use crate::synth::Synthesizer;
use crate::types::{AudioClip, VoiceSettings};
use narravox_foundation::error::{EngineError, ProviderError};
use narravox_foundation::CancelToken;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct FanoutOptions {
    /// Maximum provider calls in flight for one job.
    pub max_in_flight: usize,
}

impl Default for FanoutOptions {
    fn default() -> Self {
        Self { max_in_flight: 4 }
    }
}

/// Progress notification emitted after every completed chunk.
#[derive(Debug, Clone, Copy)]
pub struct ChunkProgress {
    pub completed: usize,
    pub total: usize,
}

/// Synthesize all chunks, bounded by `opts.max_in_flight`, and return
/// the clips in original chunk order.
///
/// The first chunk to exhaust its retries fails the whole call; chunks
/// that have not started yet are skipped, in-flight ones drain first.
pub async fn synthesize_chunks(
    synth: Arc<dyn Synthesizer>,
    chunks: Vec<String>,
    voice: &VoiceSettings,
    policy: &RetryPolicy,
    opts: &FanoutOptions,
    cancel: &CancelToken,
    progress: Option<mpsc::UnboundedSender<ChunkProgress>>,
) -> Result<Vec<AudioClip>, EngineError> {
    let total = chunks.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let semaphore = Arc::new(Semaphore::new(opts.max_in_flight.max(1)));
    // Internal stop flag: raised on the first hard failure so queued
    // chunks do not burn provider quota.
    let abort = CancelToken::new();
    let mut tasks = JoinSet::new();

    for (index, text) in chunks.into_iter().enumerate() {
        let synth = Arc::clone(&synth);
        let voice = voice.clone();
        let policy = policy.clone();
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let abort = abort.clone();

        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("chunk semaphore closed");
            if cancel.is_cancelled() || abort.is_cancelled() {
                return (index, Err(EngineError::Cancelled));
            }
            tracing::debug!(chunk = index, chars = text.chars().count(), "synthesizing chunk");
            (
                index,
                synthesize_with_retry(synth.as_ref(), &text, &voice, &policy).await,
            )
        });
    }

    let mut clips: Vec<Option<AudioClip>> = vec![None; total];
    let mut completed = 0usize;
    let mut first_error: Option<EngineError> = None;

    while let Some(joined) = tasks.join_next().await {
        let (index, outcome) = joined.map_err(|e| {
            EngineError::Provider(ProviderError::Unavailable(format!(
                "synthesis task failed: {e}"
            )))
        })?;
        match outcome {
            Ok(clip) => {
                clips[index] = Some(clip);
                completed += 1;
                if let Some(tx) = &progress {
                    let _ = tx.send(ChunkProgress { completed, total });
                }
            }
            Err(EngineError::Cancelled) => {
                // Skipped after cancellation or a sibling failure.
            }
            Err(e) => {
                if first_error.is_none() {
                    tracing::error!(chunk = index, error = %e, "chunk failed, stopping fan-out");
                    first_error = Some(e);
                    abort.request();
                }
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    cancel.checkpoint()?;

    let mut out = Vec::with_capacity(total);
    for (chunk_index, clip) in clips.into_iter().enumerate() {
        match clip {
            Some(c) => out.push(c),
            None => {
                return Err(EngineError::Concatenation {
                    chunk_index,
                    reason: "missing chunk audio".to_string(),
                })
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Synthesizer that tags each clip with its chunk index (first
    /// sample) and can fail scripted chunks.
    struct IndexedSynth {
        delay_ms: Vec<u64>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Synthesizer for IndexedSynth {
        fn name(&self) -> &str {
            "indexed"
        }

        fn max_chars(&self) -> usize {
            64
        }

        async fn synthesize(
            &self,
            text: &str,
            _voice: &VoiceSettings,
        ) -> Result<AudioClip, ProviderError> {
            *self.calls.lock() += 1;
            let index: usize = text.trim().parse().expect("test chunks are indices");
            let delay = self.delay_ms.get(index).copied().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(AudioClip::new(vec![index as i16; 8], 24_000))
        }
    }

    fn test_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            call_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn clips_come_back_in_chunk_order_despite_uneven_latency() {
        // Earlier chunks are slower, so completion order is reversed.
        let synth = Arc::new(IndexedSynth {
            delay_ms: vec![80, 40, 5],
            calls: Mutex::new(0),
        });
        let chunks = vec!["0".to_string(), "1".to_string(), "2".to_string()];
        let clips = synthesize_chunks(
            synth,
            chunks,
            &VoiceSettings::default(),
            &test_policy(),
            &FanoutOptions { max_in_flight: 3 },
            &CancelToken::new(),
            None,
        )
        .await
        .expect("fan-out succeeds");

        let order: Vec<i16> = clips.iter().map(|c| c.samples[0]).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn progress_reaches_total() {
        let synth = Arc::new(IndexedSynth {
            delay_ms: vec![0; 5],
            calls: Mutex::new(0),
        });
        let chunks = (0..5).map(|i| i.to_string()).collect();
        let (tx, mut rx) = mpsc::unbounded_channel();
        synthesize_chunks(
            synth,
            chunks,
            &VoiceSettings::default(),
            &test_policy(),
            &FanoutOptions { max_in_flight: 2 },
            &CancelToken::new(),
            Some(tx),
        )
        .await
        .expect("fan-out succeeds");

        let mut last = None;
        while let Ok(p) = rx.try_recv() {
            last = Some(p);
        }
        let last = last.expect("progress was reported");
        assert_eq!(last.completed, 5);
        assert_eq!(last.total, 5);
    }

    #[tokio::test]
    async fn pre_cancelled_fanout_synthesizes_nothing() {
        let synth = Arc::new(IndexedSynth {
            delay_ms: vec![0; 3],
            calls: Mutex::new(0),
        });
        let cancel = CancelToken::new();
        cancel.request();
        let result = synthesize_chunks(
            Arc::clone(&synth) as Arc<dyn Synthesizer>,
            (0..3).map(|i| i.to_string()).collect(),
            &VoiceSettings::default(),
            &test_policy(),
            &FanoutOptions::default(),
            &cancel,
            None,
        )
        .await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(*synth.calls.lock(), 0);
    }
}
