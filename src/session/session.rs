//! One transcription session: mel cache, decoder state, segment phase.

use crate::config::Config;
use crate::decoder::state::{
    CheckpointChain, DecoderState, SegmentPhase, TokenEvent,
};
use crate::features::cache::MelCache;
use crate::features::mel::{MelExtractor, MelFrame};
use crate::runtime::adapter::{InferenceRuntime, JointNetwork};
use serde::Serialize;
use std::fmt;
use std::time::Instant;

/// Identifier of a logical transcription session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Aggregate state for one session.
///
/// Owned exclusively by the coordinator's session table and only ever
/// touched under the per-session lock; nothing here is shared across
/// sessions.
pub struct TranscriptionSession {
    pub(crate) id: SessionId,
    pub(crate) extractor: MelExtractor,
    pub(crate) mel_cache: MelCache,
    pub(crate) decoder_state: DecoderState,
    pub(crate) checkpoints: CheckpointChain,
    /// Segment counter, bumped on every flush or reset.
    pub(crate) segment: u32,
    pub(crate) last_activity: Instant,
}

impl TranscriptionSession {
    pub fn new<J: JointNetwork>(
        id: SessionId,
        config: &Config,
        runtime: &InferenceRuntime<J>,
    ) -> Self {
        let extractor = MelExtractor::new(config.features.clone(), config.audio.sample_rate);
        let mel_cache = MelCache::new(config.features.hop_size);
        let decoder_state =
            DecoderState::fresh(runtime.init_hidden(), runtime.blank_token(), 0);
        Self {
            id,
            extractor,
            mel_cache,
            decoder_state,
            checkpoints: CheckpointChain::new(config.decoder.checkpoint_depth),
            segment: 0,
            last_activity: Instant::now(),
        }
    }

    /// Extends the audio tail; new frames land in the mel cache and are
    /// returned for decoding.
    pub(crate) fn extend(&mut self, offset: u64, samples: &[f32]) -> crate::error::Result<Vec<MelFrame>> {
        let frames = self.extractor.extend(offset, samples)?;
        self.mel_cache.append(&frames)?;
        self.last_activity = Instant::now();
        Ok(frames)
    }

    /// Discards the current segment's caches and starts the next segment at
    /// the present stream position.
    ///
    /// Called on segment boundaries and explicit rewind. The sample clock
    /// keeps running, so audio continuity with the source is preserved.
    pub(crate) fn reset_segment<J: JointNetwork>(&mut self, runtime: &InferenceRuntime<J>) {
        self.extractor.reset();
        self.mel_cache.clear();
        self.decoder_state = DecoderState::fresh(
            runtime.init_hidden(),
            runtime.blank_token(),
            self.extractor.next_frame_index(),
        );
        self.checkpoints.clear();
        self.segment += 1;
        self.last_activity = Instant::now();
    }

    /// Marks the current segment flushed and returns its tokens.
    pub(crate) fn take_segment_tokens(&mut self) -> Vec<TokenEvent> {
        self.decoder_state.phase = SegmentPhase::Flushed;
        std::mem::take(&mut self.decoder_state.emitted)
    }

    /// Time since the last extend/decode touched this session.
    pub(crate) fn idle_for(&self) -> std::time::Duration {
        self.last_activity.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::adapter::MockJoint;

    fn session() -> (TranscriptionSession, InferenceRuntime<MockJoint>) {
        let config = Config::default();
        let runtime = InferenceRuntime::new(MockJoint::new(32));
        let session = TranscriptionSession::new(SessionId::from("test"), &config, &runtime);
        (session, runtime)
    }

    fn sine(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16000.0).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_session_id_display() {
        let id = SessionId::from("mic-0");
        assert_eq!(id.to_string(), "mic-0");
        assert_eq!(id.as_str(), "mic-0");
    }

    #[test]
    fn test_extend_fills_mel_cache() {
        let (mut session, _runtime) = session();
        let frames = session.extend(0, &sine(1600)).unwrap();
        assert!(!frames.is_empty());
        assert_eq!(session.mel_cache.len(), frames.len());
    }

    #[test]
    fn test_extend_failure_leaves_cache_untouched() {
        let (mut session, _runtime) = session();
        session.extend(0, &sine(1600)).unwrap();
        let cached = session.mel_cache.len();

        let mut bad = sine(1600);
        bad[0] = f32::NAN;
        assert!(session.extend(1600, &bad).is_err());
        assert_eq!(session.mel_cache.len(), cached);
    }

    #[test]
    fn test_reset_segment_clears_and_bumps() {
        let (mut session, runtime) = session();
        session.extend(0, &sine(1600)).unwrap();
        assert!(!session.mel_cache.is_empty());

        session.reset_segment(&runtime);
        assert!(session.mel_cache.is_empty());
        assert_eq!(session.segment, 1);
        assert_eq!(session.decoder_state.phase(), SegmentPhase::Idle);
        assert!(session.decoder_state.emitted().is_empty());

        // Stream continuity is preserved across the reset
        assert!(session.extend(0, &sine(100)).is_err());
        assert!(session.extend(1600, &sine(1600)).is_ok());
    }
}
