//! Per-session feature frame cache.
//!
//! Append-only, gap-free sequence of mel frames. The cache is the record of
//! what the decoder may still be asked to consume; entries are only ever
//! removed by a session reset.

use crate::error::{EngineError, Result};
use crate::features::mel::MelFrame;

/// Ordered, append-only store of mel frames for one session.
pub struct MelCache {
    frames: Vec<MelFrame>,
    hop_size: usize,
}

impl MelCache {
    pub fn new(hop_size: usize) -> Self {
        Self {
            frames: Vec::new(),
            hop_size,
        }
    }

    /// Appends frames, enforcing hop-spaced continuity.
    ///
    /// An empty cache accepts any starting offset (segments after a reset
    /// begin mid-stream); after that each frame must start exactly one hop
    /// after its predecessor.
    pub fn append(&mut self, frames: &[MelFrame]) -> Result<()> {
        for frame in frames {
            if let Some(last) = self.frames.last() {
                let expected = last.offset + self.hop_size as u64;
                if frame.offset != expected {
                    return Err(EngineError::CacheContinuity {
                        expected,
                        got: frame.offset,
                    });
                }
            }
            self.frames.push(frame.clone());
        }
        Ok(())
    }

    /// All cached frames, oldest first.
    pub fn frames(&self) -> &[MelFrame] {
        &self.frames
    }

    /// Frames at or after the given frame index.
    pub fn frames_from(&self, frame_index: u64) -> &[MelFrame] {
        let pos = self
            .frames
            .partition_point(|f| f.index(self.hop_size) < frame_index);
        &self.frames[pos..]
    }

    /// Number of cached frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Index one past the newest cached frame, or `None` when empty.
    pub fn next_index(&self) -> Option<u64> {
        self.frames.last().map(|f| f.index(self.hop_size) + 1)
    }

    /// Discards everything. Only a session reset calls this.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
