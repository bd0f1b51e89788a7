//! Decoder-side state: hidden tensors, emitted tokens, checkpoints.

use ndarray::Array3;
use serde::Serialize;
use std::collections::VecDeque;

/// Recurrent hidden state of the prediction network.
///
/// Two stacked tensors, shaped by the network (`layers, batch, width`). The
/// engine treats the contents as opaque; it only clones, swaps, and hands
/// views of them to the inference call.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderHidden {
    pub state_a: Array3<f32>,
    pub state_b: Array3<f32>,
}

impl DecoderHidden {
    pub fn zeros(dims: (usize, usize, usize)) -> Self {
        Self {
            state_a: Array3::zeros(dims),
            state_b: Array3::zeros(dims),
        }
    }
}

/// One emitted token with its alignment metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenEvent {
    /// Vocabulary index of the token.
    pub token: u32,
    /// Feature frame the token was emitted on.
    pub frame_index: u64,
    /// Frame time in seconds from session start.
    pub time_secs: f32,
    /// Softmax probability of the emitted token.
    pub confidence: f32,
}

/// Per-segment phase of the decode state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SegmentPhase {
    /// No frames consumed yet in this segment.
    Idle,
    /// At least one decode call has run.
    Decoding,
    /// Segment finalized; the next segment starts fresh.
    Flushed,
}

/// Key identifying a resumable decode prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub session: String,
    pub frames_consumed: u64,
}

impl CacheKey {
    /// Audio prefix already folded into the state, in seconds.
    pub fn prefix_secs(&self, hop_size: usize, sample_rate: u32) -> f32 {
        (self.frames_consumed * hop_size as u64) as f32 / sample_rate as f32
    }
}

/// Mutable decode state owned by exactly one session.
#[derive(Debug, Clone)]
pub struct DecoderState {
    pub(crate) hidden: DecoderHidden,
    pub(crate) last_token: i64,
    pub(crate) emitted: Vec<TokenEvent>,
    /// Absolute index of the next feature frame this state expects.
    pub(crate) frames_consumed: u64,
    /// Frames the last call's duration outputs jumped past the batch end;
    /// consumed silently at the start of the next call.
    pub(crate) skip_ahead: u64,
    pub(crate) phase: SegmentPhase,
}

impl DecoderState {
    /// Fresh state expecting the given frame index next.
    pub fn fresh(hidden: DecoderHidden, blank_token: i64, expect_frame: u64) -> Self {
        Self {
            hidden,
            last_token: blank_token,
            emitted: Vec::new(),
            frames_consumed: expect_frame,
            skip_ahead: 0,
            phase: SegmentPhase::Idle,
        }
    }

    /// Tokens emitted so far in this segment, oldest first.
    pub fn emitted(&self) -> &[TokenEvent] {
        &self.emitted
    }

    /// Absolute index of the next frame this state will accept.
    pub fn frames_consumed(&self) -> u64 {
        self.frames_consumed
    }

    pub fn phase(&self) -> SegmentPhase {
        self.phase
    }

    /// The resumable-prefix key for this state.
    pub fn cache_key(&self, session: &str) -> CacheKey {
        CacheKey {
            session: session.to_string(),
            frames_consumed: self.frames_consumed,
        }
    }
}

/// Snapshot of a decode state after a successful call.
#[derive(Debug, Clone)]
pub struct DecodeCheckpoint {
    pub frames_consumed: u64,
    pub(crate) hidden: DecoderHidden,
    pub(crate) last_token: i64,
    pub(crate) skip_ahead: u64,
    pub(crate) emitted_len: usize,
}

impl DecodeCheckpoint {
    pub fn of(state: &DecoderState) -> Self {
        Self {
            frames_consumed: state.frames_consumed,
            hidden: state.hidden.clone(),
            last_token: state.last_token,
            skip_ahead: state.skip_ahead,
            emitted_len: state.emitted.len(),
        }
    }
}

/// Bounded chain of checkpoints with strictly increasing prefixes.
#[derive(Debug)]
pub struct CheckpointChain {
    entries: VecDeque<DecodeCheckpoint>,
    depth: usize,
}

impl CheckpointChain {
    pub fn new(depth: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            depth,
        }
    }

    /// Records a checkpoint. Non-increasing prefixes are ignored (the call
    /// consumed nothing new, so the previous checkpoint already covers it).
    pub fn push(&mut self, checkpoint: DecodeCheckpoint) {
        if let Some(last) = self.entries.back()
            && checkpoint.frames_consumed <= last.frames_consumed
        {
            return;
        }
        if self.entries.len() == self.depth {
            self.entries.pop_front();
        }
        self.entries.push_back(checkpoint);
    }

    /// Finds the checkpoint recorded at exactly this prefix.
    pub fn find(&self, frames_consumed: u64) -> Option<&DecodeCheckpoint> {
        self.entries
            .iter()
            .find(|c| c.frames_consumed == frames_consumed)
    }

    /// The most recent checkpoint, if any.
    pub fn latest(&self) -> Option<&DecodeCheckpoint> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Restores `state` to the checkpoint at the given prefix, truncating
    /// tokens emitted after it. Returns false if no such checkpoint remains.
    pub fn rewind(&self, frames_consumed: u64, state: &mut DecoderState) -> bool {
        let Some(checkpoint) = self.find(frames_consumed) else {
            return false;
        };
        state.hidden = checkpoint.hidden.clone();
        state.last_token = checkpoint.last_token;
        state.skip_ahead = checkpoint.skip_ahead;
        state.frames_consumed = checkpoint.frames_consumed;
        state.emitted.truncate(checkpoint.emitted_len);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(frames: u64) -> DecoderState {
        DecoderState::fresh(DecoderHidden::zeros((1, 1, 4)), 32, frames)
    }

    #[test]
    fn test_fresh_state_is_idle() {
        let s = state(0);
        assert_eq!(s.phase(), SegmentPhase::Idle);
        assert_eq!(s.frames_consumed(), 0);
        assert!(s.emitted().is_empty());
    }

    #[test]
    fn test_cache_key_prefix_secs() {
        let key = CacheKey {
            session: "mic-0".to_string(),
            frames_consumed: 300,
        };
        // 300 frames * 160 samples at 16kHz = 3s
        assert!((key.prefix_secs(160, 16000) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_chain_strictly_increasing() {
        let mut chain = CheckpointChain::new(4);
        chain.push(DecodeCheckpoint::of(&state(10)));
        chain.push(DecodeCheckpoint::of(&state(10))); // ignored
        chain.push(DecodeCheckpoint::of(&state(5))); // ignored
        chain.push(DecodeCheckpoint::of(&state(20)));

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.latest().unwrap().frames_consumed, 20);
    }

    #[test]
    fn test_chain_bounded_depth() {
        let mut chain = CheckpointChain::new(2);
        for frames in [10, 20, 30] {
            chain.push(DecodeCheckpoint::of(&state(frames)));
        }
        assert_eq!(chain.len(), 2);
        assert!(chain.find(10).is_none());
        assert!(chain.find(30).is_some());
    }

    #[test]
    fn test_rewind_restores_state() {
        let mut chain = CheckpointChain::new(4);

        let mut s = state(10);
        s.emitted.push(TokenEvent {
            token: 3,
            frame_index: 4,
            time_secs: 0.04,
            confidence: 0.9,
        });
        chain.push(DecodeCheckpoint::of(&s));

        // advance and emit more
        s.frames_consumed = 25;
        s.last_token = 7;
        s.emitted.push(TokenEvent {
            token: 7,
            frame_index: 20,
            time_secs: 0.2,
            confidence: 0.8,
        });

        assert!(chain.rewind(10, &mut s));
        assert_eq!(s.frames_consumed(), 10);
        assert_eq!(s.emitted().len(), 1);
        assert_eq!(s.emitted()[0].token, 3);

        assert!(!chain.rewind(99, &mut s));
    }
}
