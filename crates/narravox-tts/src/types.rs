//! Core types for speech synthesis.

use serde::{Deserialize, Serialize};

/// Voice configuration attached to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// Provider identifier, e.g. "openai" or "eleven".
    pub provider: String,
    /// Provider-specific voice id; the provider default when absent.
    pub voice_id: Option<String>,
    /// Speaking rate in words per minute.
    pub speaking_rate: Option<u32>,
    /// Free-form style hint passed through to the provider.
    pub style: Option<String>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            voice_id: None,
            speaking_rate: None,
            style: None,
        }
    }
}

/// A clip of synthesized audio: 16-bit mono PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<i16>,
    pub sample_rate_hz: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<i16>, sample_rate_hz: u32) -> Self {
        Self {
            samples,
            sample_rate_hz,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate_hz as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_duration_from_sample_count() {
        let clip = AudioClip::new(vec![0; 24_000], 24_000);
        assert!((clip.duration_seconds() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_rate_clip_has_zero_duration() {
        let clip = AudioClip::new(vec![0; 100], 0);
        assert_eq!(clip.duration_seconds(), 0.0);
    }
}
