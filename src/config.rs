use crate::defaults;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub features: FeatureConfig,
    pub decoder: DecoderConfig,
    pub vad: VadConfig,
    pub session: SessionConfig,
}

/// Audio input configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Seconds of sample history the ring buffer retains.
    pub ring_buffer_secs: u64,
}

/// Mel frontend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureConfig {
    pub fft_size: usize,
    pub window_size: usize,
    pub hop_size: usize,
    pub mel_bins: usize,
    pub preemphasis: f32,
    pub freq_min: f32,
    pub freq_max: f32,
}

/// Transducer decode loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecoderConfig {
    pub max_tokens_per_frame: u32,
    pub max_frames_per_call: usize,
    pub checkpoint_depth: usize,
}

/// Voice activity gate configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadConfig {
    pub threshold: f32,
    pub silence_hangover_ms: u32,
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            ring_buffer_secs: defaults::RING_BUFFER_SECS,
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            fft_size: defaults::FFT_SIZE,
            window_size: defaults::WINDOW_SIZE,
            hop_size: defaults::HOP_SIZE,
            mel_bins: defaults::MEL_BINS,
            preemphasis: defaults::PREEMPHASIS,
            freq_min: defaults::MEL_FREQ_MIN,
            freq_max: defaults::MEL_FREQ_MAX,
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_frame: defaults::MAX_TOKENS_PER_FRAME,
            max_frames_per_call: defaults::MAX_FRAMES_PER_CALL,
            checkpoint_depth: defaults::CHECKPOINT_DEPTH,
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::VAD_THRESHOLD,
            silence_hangover_ms: defaults::SILENCE_HANGOVER_MS,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: defaults::IDLE_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - STREAMSCRIBE_SAMPLE_RATE → audio.sample_rate
    /// - STREAMSCRIBE_VAD_THRESHOLD → vad.threshold
    /// - STREAMSCRIBE_IDLE_TIMEOUT_SECS → session.idle_timeout_secs
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(rate) = std::env::var("STREAMSCRIBE_SAMPLE_RATE")
            && let Ok(rate) = rate.parse()
        {
            self.audio.sample_rate = rate;
        }

        if let Ok(threshold) = std::env::var("STREAMSCRIBE_VAD_THRESHOLD")
            && let Ok(threshold) = threshold.parse()
        {
            self.vad.threshold = threshold;
        }

        if let Ok(timeout) = std::env::var("STREAMSCRIBE_IDLE_TIMEOUT_SECS")
            && let Ok(timeout) = timeout.parse()
        {
            self.session.idle_timeout_secs = timeout;
        }

        self
    }

    /// Check cross-field invariants the serde layer cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(EngineError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.features.hop_size == 0 || self.features.hop_size > self.features.window_size {
            return Err(EngineError::ConfigInvalidValue {
                key: "features.hop_size".to_string(),
                message: "must be positive and no larger than window_size".to_string(),
            });
        }
        if self.features.window_size > self.features.fft_size {
            return Err(EngineError::ConfigInvalidValue {
                key: "features.window_size".to_string(),
                message: "must not exceed fft_size".to_string(),
            });
        }
        if self.features.mel_bins == 0 {
            return Err(EngineError::ConfigInvalidValue {
                key: "features.mel_bins".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.features.preemphasis) {
            return Err(EngineError::ConfigInvalidValue {
                key: "features.preemphasis".to_string(),
                message: "must be in [0, 1)".to_string(),
            });
        }
        let nyquist = self.audio.sample_rate as f32 / 2.0;
        if self.features.freq_min >= self.features.freq_max || self.features.freq_max > nyquist {
            return Err(EngineError::ConfigInvalidValue {
                key: "features.freq_max".to_string(),
                message: format!("mel range must be within (freq_min, {nyquist}]"),
            });
        }
        if self.decoder.max_tokens_per_frame == 0 {
            return Err(EngineError::ConfigInvalidValue {
                key: "decoder.max_tokens_per_frame".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.decoder.max_frames_per_call == 0 {
            return Err(EngineError::ConfigInvalidValue {
                key: "decoder.max_frames_per_call".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
