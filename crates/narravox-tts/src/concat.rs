//! Ordered concatenation of chunk audio.

use crate::types::AudioClip;
use narravox_foundation::error::EngineError;

/// Merge clips, in the order given, into one continuous clip.
///
/// Every clip must be non-empty and share the first clip's sample rate;
/// a violation fails with the offending chunk index in the diagnostics.
pub fn concatenate(clips: &[AudioClip]) -> Result<AudioClip, EngineError> {
    let first = clips.first().ok_or(EngineError::Concatenation {
        chunk_index: 0,
        reason: "no audio chunks to concatenate".to_string(),
    })?;
    let sample_rate_hz = first.sample_rate_hz;

    let mut total = 0usize;
    for (chunk_index, clip) in clips.iter().enumerate() {
        if clip.is_empty() {
            return Err(EngineError::Concatenation {
                chunk_index,
                reason: "empty chunk audio".to_string(),
            });
        }
        if clip.sample_rate_hz != sample_rate_hz {
            return Err(EngineError::Concatenation {
                chunk_index,
                reason: format!(
                    "sample rate mismatch: {} != {}",
                    clip.sample_rate_hz, sample_rate_hz
                ),
            });
        }
        total += clip.samples.len();
    }

    let mut samples = Vec::with_capacity(total);
    for clip in clips {
        samples.extend_from_slice(&clip.samples);
    }
    Ok(AudioClip::new(samples, sample_rate_hz))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_in_order() {
        let clips = vec![
            AudioClip::new(vec![1, 1], 24_000),
            AudioClip::new(vec![2], 24_000),
            AudioClip::new(vec![3, 3, 3], 24_000),
        ];
        let merged = concatenate(&clips).expect("clips are valid");
        assert_eq!(merged.samples, vec![1, 1, 2, 3, 3, 3]);
        assert_eq!(merged.sample_rate_hz, 24_000);
    }

    #[test]
    fn empty_chunk_reports_its_index() {
        let clips = vec![
            AudioClip::new(vec![1], 24_000),
            AudioClip::new(vec![], 24_000),
        ];
        match concatenate(&clips) {
            Err(EngineError::Concatenation { chunk_index, .. }) => assert_eq!(chunk_index, 1),
            other => panic!("expected concatenation error, got {other:?}"),
        }
    }

    #[test]
    fn rate_mismatch_reports_its_index() {
        let clips = vec![
            AudioClip::new(vec![1], 24_000),
            AudioClip::new(vec![2], 22_050),
        ];
        match concatenate(&clips) {
            Err(EngineError::Concatenation { chunk_index, reason }) => {
                assert_eq!(chunk_index, 1);
                assert!(reason.contains("22050"));
            }
            other => panic!("expected concatenation error, got {other:?}"),
        }
    }

    #[test]
    fn no_chunks_is_an_error() {
        assert!(concatenate(&[]).is_err());
    }
}
