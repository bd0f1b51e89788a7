//! Ring buffer for continuous audio accumulation.
//!
//! Holds recent PCM history indexed by absolute sample offset so downstream
//! stages can ask for "samples in [a, b)" without copies being taken at
//! capture time. Bounded; old samples fall off the front as new ones arrive.

use crate::error::{EngineError, Result};
use std::collections::VecDeque;

/// Audio sample accumulator with absolute-offset range extraction.
///
/// Samples are appended in strictly increasing offset order with no gaps.
/// The buffer tracks the offset of its first retained sample so extraction
/// stays correct after old history has been dropped.
pub struct RingAudioBuffer {
    samples: VecDeque<f32>,
    /// Absolute offset of `samples[0]`.
    base: u64,
    /// Maximum samples retained before the oldest are dropped.
    capacity: usize,
    sample_rate: u32,
}

impl RingAudioBuffer {
    /// Creates a buffer retaining up to `history_secs` seconds of audio.
    pub fn new(sample_rate: u32, history_secs: u64) -> Self {
        let capacity = (sample_rate as u64 * history_secs) as usize;
        Self {
            samples: VecDeque::with_capacity(capacity.min(64 * 1024)),
            base: 0,
            capacity,
            sample_rate,
        }
    }

    /// Creates a buffer sized from the audio configuration.
    pub fn from_config(config: &crate::config::AudioConfig) -> Self {
        Self::new(config.sample_rate, config.ring_buffer_secs)
    }

    /// Appends a chunk starting at the given absolute offset.
    ///
    /// The chunk must be the direct continuation of what the buffer has
    /// already seen; a gap or overlap is a contract violation by the
    /// audio source.
    pub fn push_chunk(&mut self, offset: u64, chunk: &[f32]) -> Result<()> {
        let expected = self.next_offset();
        if offset != expected {
            return Err(EngineError::Audio {
                message: format!(
                    "non-contiguous audio chunk: expected offset {expected}, got {offset}"
                ),
            });
        }

        self.samples.extend(chunk.iter().copied());

        while self.samples.len() > self.capacity {
            self.samples.pop_front();
            self.base += 1;
        }

        Ok(())
    }

    /// Returns samples in `[start, end)`, or `None` if any part of the range
    /// has been dropped or has not arrived yet.
    pub fn range(&self, start: u64, end: u64) -> Option<Vec<f32>> {
        if start < self.base || end > self.next_offset() || start > end {
            return None;
        }
        let lo = (start - self.base) as usize;
        let hi = (end - self.base) as usize;
        Some(self.samples.range(lo..hi).copied().collect())
    }

    /// Absolute offset one past the newest sample.
    pub fn next_offset(&self) -> u64 {
        self.base + self.samples.len() as u64
    }

    /// Absolute offset of the oldest retained sample.
    pub fn oldest_offset(&self) -> u64 {
        self.base
    }

    /// Number of samples currently retained.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if no samples are retained.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample rate the buffer was created with.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Drops all history and restarts offsets at zero.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.base = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_range() {
        let mut buffer = RingAudioBuffer::new(16000, 10);
        buffer.push_chunk(0, &[1.0, 2.0, 3.0, 4.0]).unwrap();

        assert_eq!(buffer.range(1, 3), Some(vec![2.0, 3.0]));
        assert_eq!(buffer.next_offset(), 4);
    }

    #[test]
    fn test_rejects_gap() {
        let mut buffer = RingAudioBuffer::new(16000, 10);
        buffer.push_chunk(0, &[0.0; 100]).unwrap();

        let result = buffer.push_chunk(150, &[0.0; 100]);
        assert!(matches!(result, Err(EngineError::Audio { .. })));
    }

    #[test]
    fn test_rejects_overlap() {
        let mut buffer = RingAudioBuffer::new(16000, 10);
        buffer.push_chunk(0, &[0.0; 100]).unwrap();

        assert!(buffer.push_chunk(50, &[0.0; 100]).is_err());
    }

    #[test]
    fn test_range_unavailable_returns_none() {
        let mut buffer = RingAudioBuffer::new(16000, 10);
        buffer.push_chunk(0, &[0.0; 100]).unwrap();

        // Not arrived yet
        assert_eq!(buffer.range(50, 150), None);
    }

    #[test]
    fn test_old_history_dropped_at_capacity() {
        // 1 second capacity at a tiny "rate" to keep the test small
        let mut buffer = RingAudioBuffer::new(100, 1);
        buffer.push_chunk(0, &[1.0; 100]).unwrap();
        buffer.push_chunk(100, &[2.0; 50]).unwrap();

        assert_eq!(buffer.len(), 100);
        assert_eq!(buffer.oldest_offset(), 50);
        // Dropped range is gone
        assert_eq!(buffer.range(0, 10), None);
        // Retained range still indexed by absolute offset
        assert_eq!(buffer.range(100, 102), Some(vec![2.0, 2.0]));
    }

    #[test]
    fn test_reset_restarts_offsets() {
        let mut buffer = RingAudioBuffer::new(16000, 10);
        buffer.push_chunk(0, &[0.0; 320]).unwrap();
        buffer.reset();

        assert!(buffer.is_empty());
        assert_eq!(buffer.next_offset(), 0);
        buffer.push_chunk(0, &[1.0; 10]).unwrap();
        assert_eq!(buffer.len(), 10);
    }
}
