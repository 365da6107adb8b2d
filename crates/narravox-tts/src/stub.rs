//! Stub synthesizer for tests, demos, and provider-free environments.

use crate::synth::Synthesizer;
use crate::types::{AudioClip, VoiceSettings};
use async_trait::async_trait;
use narravox_foundation::error::ProviderError;

/// Deterministic offline synthesizer.
///
/// Produces a quiet tone whose duration tracks the word count at the
/// configured speaking rate, so durations behave like real narration
/// without any provider dependency.
#[derive(Debug, Clone)]
pub struct StubSynthesizer {
    pub sample_rate_hz: u32,
    pub max_chars: usize,
    pub words_per_minute: u32,
}

impl Default for StubSynthesizer {
    fn default() -> Self {
        Self {
            sample_rate_hz: 24_000,
            max_chars: crate::chunker::DEFAULT_MAX_CHARS,
            words_per_minute: 180,
        }
    }
}

#[async_trait]
impl Synthesizer for StubSynthesizer {
    fn name(&self) -> &str {
        "stub"
    }

    fn max_chars(&self) -> usize {
        self.max_chars
    }

    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceSettings,
    ) -> Result<AudioClip, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::InvalidRequest(
                "cannot synthesize empty text".to_string(),
            ));
        }

        let words = text.split_whitespace().count().max(1);
        let seconds = words as f64 * 60.0 / self.words_per_minute.max(1) as f64;
        let sample_count = ((seconds * self.sample_rate_hz as f64) as usize).max(1);

        let mut samples = Vec::with_capacity(sample_count);
        for n in 0..sample_count {
            let t = n as f64 / self.sample_rate_hz as f64;
            let v = (t * 440.0 * std::f64::consts::TAU).sin() * 600.0;
            samples.push(v as i16);
        }
        Ok(AudioClip::new(samples, self.sample_rate_hz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duration_scales_with_word_count() {
        let synth = StubSynthesizer::default();
        let voice = VoiceSettings::default();
        let short = synth.synthesize("one two three", &voice).await.unwrap();
        let long = synth
            .synthesize("one two three four five six", &voice)
            .await
            .unwrap();
        assert!(long.duration_seconds() > short.duration_seconds());
        assert!(short.duration_seconds() > 0.0);
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let synth = StubSynthesizer::default();
        let err = synth
            .synthesize("   ", &VoiceSettings::default())
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
