//! Incremental log-mel spectrogram extraction.
//!
//! The extractor consumes a contiguous sample stream and produces one feature
//! frame per hop, each computed from exactly the samples of its own window.
//! Because a frame depends only on its absolute sample range, splitting the
//! stream across any number of `extend` calls yields byte-identical frames to
//! a single batch call, and previously produced frames are never recomputed.
//!
//! Frontend parameters follow the reference transducer models: 25ms periodic
//! Hann window zero-padded to a 512-point FFT, 10ms hop, 0.97 pre-emphasis,
//! 128 Slaney mel bins, per-frame `ln(energy + guard)` with no utterance-level
//! normalization (a global normalization pass would make a frame's value
//! depend on audio outside its window and break incrementality).

use crate::config::FeatureConfig;
use crate::defaults;
use crate::error::{EngineError, Result};
use crate::features::filterbank;
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// One log-mel feature frame.
///
/// `offset` is the absolute sample offset of the window start. Two frames
/// with equal offset over equal audio are byte-identical.
#[derive(Debug, Clone, PartialEq)]
pub struct MelFrame {
    pub offset: u64,
    pub values: Vec<f32>,
}

impl MelFrame {
    /// Frame index in hop units.
    pub fn index(&self, hop_size: usize) -> u64 {
        self.offset / hop_size as u64
    }

    /// Time of the window start in seconds.
    pub fn time_secs(&self, sample_rate: u32) -> f32 {
        self.offset as f32 / sample_rate as f32
    }
}

/// Incremental mel extractor for one session.
///
/// Retains only the unconsumed sample tail (plus one sample of pre-emphasis
/// context); consumed history is dropped as frames are produced.
pub struct MelExtractor {
    config: FeatureConfig,
    sample_rate: u32,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    filterbank: Vec<f32>,

    /// Retained raw samples; `tail[0]` sits at absolute offset `tail_offset`.
    tail: Vec<f32>,
    tail_offset: u64,
    /// Total samples observed (absolute offset one past the newest sample).
    samples_seen: u64,
    /// Absolute offset of the next window to compute.
    next_frame_start: u64,
    flushed: bool,

    // Reused per-frame scratch
    fft_input: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
}

impl MelExtractor {
    pub fn new(config: FeatureConfig, sample_rate: u32) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(config.fft_size);
        let n_freqs = config.fft_size / 2 + 1;

        // Periodic Hann window over the analysis length
        let window: Vec<f32> = (0..config.window_size)
            .map(|i| {
                0.5 * (1.0
                    - (2.0 * std::f32::consts::PI * i as f32 / config.window_size as f32).cos())
            })
            .collect();

        let filterbank = filterbank::build(
            config.mel_bins,
            n_freqs,
            sample_rate,
            config.freq_min,
            config.freq_max,
        );

        let fft_input = fft.make_input_vec();
        let spectrum = fft.make_output_vec();
        let fft_scratch = fft.make_scratch_vec();

        Self {
            config,
            sample_rate,
            fft,
            window,
            filterbank,
            tail: Vec::new(),
            tail_offset: 0,
            samples_seen: 0,
            next_frame_start: 0,
            flushed: false,
            fft_input,
            spectrum,
            fft_scratch,
        }
    }

    /// Extends the stream with new samples and returns every frame whose
    /// window became fully available.
    ///
    /// `offset` must be the direct continuation of the samples seen so far.
    /// Fewer than one window of buffered audio produces an empty result; no
    /// partial frame is emitted on this path. On error nothing is retained
    /// from this call, so the caller may resubmit a corrected chunk for the
    /// same range.
    pub fn extend(&mut self, offset: u64, samples: &[f32]) -> Result<Vec<MelFrame>> {
        if self.flushed {
            return Err(EngineError::Audio {
                message: "stream already flushed".to_string(),
            });
        }
        if offset != self.samples_seen {
            return Err(EngineError::CacheContinuity {
                expected: self.samples_seen,
                got: offset,
            });
        }
        for (i, &sample) in samples.iter().enumerate() {
            if !sample.is_finite() {
                return Err(EngineError::FeatureDomain {
                    offset: offset + i as u64,
                    message: "non-finite sample".to_string(),
                });
            }
        }

        let tail_len_before = self.tail.len();
        let next_frame_before = self.next_frame_start;
        self.tail.extend_from_slice(samples);
        self.samples_seen += samples.len() as u64;

        let window_size = self.config.window_size as u64;
        let hop = self.config.hop_size as u64;
        let mut frames = Vec::new();

        while self.next_frame_start + window_size <= self.samples_seen {
            match self.compute_frame(self.next_frame_start, self.config.window_size) {
                Ok(frame) => {
                    frames.push(frame);
                    self.next_frame_start += hop;
                }
                Err(e) => {
                    // Abort this call only; leave the stream as it was
                    self.tail.truncate(tail_len_before);
                    self.samples_seen = offset;
                    self.next_frame_start = next_frame_before;
                    return Err(e);
                }
            }
        }

        self.trim_tail();
        Ok(frames)
    }

    /// Emits the final zero-padded frame at end of stream, at most once.
    ///
    /// Returns `None` if no unconsumed samples remain or the stream was
    /// already flushed. After a flush the extractor accepts no further
    /// `extend` calls.
    pub fn flush(&mut self) -> Result<Option<MelFrame>> {
        if self.flushed {
            return Ok(None);
        }
        self.flushed = true;

        let Some(remaining) = self.samples_seen.checked_sub(self.next_frame_start) else {
            return Ok(None);
        };
        if remaining == 0 {
            return Ok(None);
        }

        let frame = self.compute_frame(self.next_frame_start, remaining as usize)?;
        self.next_frame_start += self.config.hop_size as u64;
        Ok(Some(frame))
    }

    /// Restarts feature extraction at the current stream position.
    ///
    /// The sample clock keeps running: the next `extend` must still continue
    /// from `samples_seen`, and the next frame starts at the following hop
    /// boundary. Retained tail samples are dropped, so the first frame of the
    /// new segment takes its pre-emphasis context as silence.
    pub fn reset(&mut self) {
        let hop = self.config.hop_size as u64;
        self.next_frame_start = self.samples_seen.div_ceil(hop) * hop;
        self.tail.clear();
        self.tail_offset = self.samples_seen;
        self.flushed = false;
    }

    /// Index of the next frame the extractor will produce.
    pub fn next_frame_index(&self) -> u64 {
        self.next_frame_start / self.config.hop_size as u64
    }

    /// Total samples observed so far.
    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    /// True once the end-of-stream flush has run.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Sample rate of the stream.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Hop size in samples.
    pub fn hop_size(&self) -> usize {
        self.config.hop_size
    }

    /// Computes one frame from `avail` real samples starting at `start`,
    /// zero-padding the rest of the window.
    fn compute_frame(&mut self, start: u64, avail: usize) -> Result<MelFrame> {
        let base = (start - self.tail_offset) as usize;
        let preemphasis = self.config.preemphasis;

        self.fft_input.fill(0.0);
        for j in 0..avail {
            let x = self.tail[base + j];
            let prev = if base + j == 0 {
                0.0
            } else {
                self.tail[base + j - 1]
            };
            self.fft_input[j] = (x - preemphasis * prev) * self.window[j];
        }

        self.fft
            .process_with_scratch(&mut self.fft_input, &mut self.spectrum, &mut self.fft_scratch)
            .map_err(|e| EngineError::FeatureDomain {
                offset: start,
                message: format!("fft failed: {e}"),
            })?;

        let n_freqs = self.config.fft_size / 2 + 1;
        let mut values = Vec::with_capacity(self.config.mel_bins);
        for m in 0..self.config.mel_bins {
            let row = &self.filterbank[m * n_freqs..(m + 1) * n_freqs];
            let mut energy = 0.0f32;
            for (k, bin) in self.spectrum.iter().enumerate() {
                energy += row[k] * bin.norm_sqr();
            }
            if !energy.is_finite() || energy < 0.0 {
                return Err(EngineError::FeatureDomain {
                    offset: start,
                    message: "non-finite or negative filterbank energy".to_string(),
                });
            }
            values.push((energy + defaults::LOG_GUARD).ln());
        }

        Ok(MelFrame {
            offset: start,
            values,
        })
    }

    /// Drops consumed history, keeping one sample of pre-emphasis context.
    fn trim_tail(&mut self) {
        let keep_from = self
            .next_frame_start
            .saturating_sub(1)
            .max(self.tail_offset);
        let drop = (keep_from - self.tail_offset) as usize;
        if drop > 0 {
            self.tail.drain(..drop);
            self.tail_offset = keep_from;
        }
    }
}
