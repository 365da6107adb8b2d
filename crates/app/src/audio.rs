//! WAV encoding for persisted job audio.

use narravox_foundation::error::EngineError;
use narravox_tts::AudioClip;
use std::io::Cursor;

/// Encode a clip as 16-bit mono WAV bytes.
pub fn encode_wav(clip: &AudioClip) -> Result<Vec<u8>, EngineError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: clip.sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| EngineError::Storage(format!("wav encoder: {e}")))?;
        for &sample in &clip.samples {
            writer
                .write_sample(sample)
                .map_err(|e| EngineError::Storage(format!("wav encode: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| EngineError::Storage(format!("wav finalize: {e}")))?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_a_riff_header_and_all_samples() {
        let clip = AudioClip::new(vec![0i16; 1000], 24_000);
        let bytes = encode_wav(&clip).expect("encodes");
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 44-byte canonical header + 2 bytes per sample.
        assert_eq!(bytes.len(), 44 + 2000);
    }
}
