//! WAV file reading and writing.
//!
//! Thin wrappers over `hound` used by tools and tests to feed recorded audio
//! through the engine. The engine itself only ever sees `f32` mono samples.

use crate::error::{EngineError, Result};
use std::path::Path;

/// Reads a WAV file as mono f32 samples in [-1.0, 1.0].
///
/// Multi-channel input is downmixed by averaging. Returns the samples and
/// the file's sample rate; resampling is the caller's concern.
pub fn read_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path).map_err(|e| EngineError::Audio {
        message: format!("failed to open {}: {e}", path.display()),
    })?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| EngineError::Audio {
                message: format!("failed to decode {}: {e}", path.display()),
            })?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| EngineError::Audio {
                    message: format!("failed to decode {}: {e}", path.display()),
                })?
        }
    };

    if channels <= 1 {
        return Ok((interleaved, spec.sample_rate));
    }

    let mono = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

/// Writes mono f32 samples as a 16-bit PCM WAV file.
pub fn write_mono(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| EngineError::Audio {
        message: format!("failed to create {}: {e}", path.display()),
    })?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).map_err(|e| EngineError::Audio {
            message: format!("failed to write {}: {e}", path.display()),
        })?;
    }
    writer.finalize().map_err(|e| EngineError::Audio {
        message: format!("failed to finalize {}: {e}", path.display()),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");

        let samples: Vec<f32> = (0..1600)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16000.0).sin() * 0.5)
            .collect();

        write_mono(&path, &samples, 16000).unwrap();
        let (read_back, rate) = read_mono(&path).unwrap();

        assert_eq!(rate, 16000);
        assert_eq!(read_back.len(), samples.len());
        // 16-bit quantization error bound
        for (a, b) in samples.iter().zip(&read_back) {
            assert!((a - b).abs() < 2.0 / i16::MAX as f32);
        }
    }

    #[test]
    fn test_read_missing_file_is_audio_error() {
        let result = read_mono(Path::new("/nonexistent/missing.wav"));
        assert!(matches!(result, Err(EngineError::Audio { .. })));
    }
}
