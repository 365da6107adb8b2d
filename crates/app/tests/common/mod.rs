//! Shared test support: a scriptable fake synthesis provider and an
//! engine factory with fast retry timings.

#![allow(dead_code)]

use async_trait::async_trait;
use narravox_app::{start, Engine, EngineOptions, EngineSettings, RetrySettings};
use narravox_foundation::error::ProviderError;
use narravox_tts::{AudioClip, Synthesizer, VoiceSettings};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Fake provider: ~0.05s of audio per word, with scriptable failures
/// and latency keyed by substrings of the chunk text.
pub struct FakeSynthesizer {
    pub sample_rate_hz: u32,
    pub max_chars: usize,
    calls: Mutex<Vec<String>>,
    failures: Mutex<Vec<(String, VecDeque<ProviderError>)>>,
    delays: Mutex<Vec<(String, Duration)>>,
}

impl FakeSynthesizer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            sample_rate_hz: 8_000,
            max_chars,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            delays: Mutex::new(Vec::new()),
        }
    }

    /// Queue errors for every chunk whose text contains `needle`; once
    /// the queue drains, calls succeed.
    pub fn fail_matching(&self, needle: &str, errors: Vec<ProviderError>) {
        self.failures
            .lock()
            .push((needle.to_string(), errors.into()));
    }

    /// Sleep before answering chunks whose text contains `needle`. An
    /// empty needle delays every call.
    pub fn delay_matching(&self, needle: &str, delay: Duration) {
        self.delays.lock().push((needle.to_string(), delay));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.contains(needle)).count()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    fn name(&self) -> &str {
        "fake"
    }

    fn max_chars(&self) -> usize {
        self.max_chars
    }

    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceSettings,
    ) -> Result<AudioClip, ProviderError> {
        self.calls.lock().push(text.to_string());

        let delay = self
            .delays
            .lock()
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, d)| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.failures.lock();
            if let Some((_, queue)) = failures
                .iter_mut()
                .find(|(needle, _)| text.contains(needle.as_str()))
            {
                if let Some(err) = queue.pop_front() {
                    return Err(err);
                }
            }
        }

        let words = text.split_whitespace().count().max(1);
        Ok(AudioClip::new(vec![100i16; words * 400], self.sample_rate_hz))
    }
}

pub fn test_settings() -> EngineSettings {
    EngineSettings {
        workers: 2,
        retry: RetrySettings {
            max_attempts: 4,
            base_delay_ms: 5,
            max_delay_ms: 20,
            call_timeout_ms: 2_000,
        },
        ..EngineSettings::default()
    }
}

pub async fn test_engine(synth: Arc<FakeSynthesizer>) -> Engine {
    start(EngineOptions::new(test_settings(), synth)).await
}
