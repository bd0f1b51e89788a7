//! Message types flowing between pipeline stations.
//!
//! Every message carries its session id and a monotonic sequence number so
//! per-session ordering is observable at every stage; the channels preserve
//! it, the tags make violations detectable.

use crate::decoder::state::TokenEvent;
use crate::features::mel::MelFrame;
use crate::session::session::SessionId;
use serde::Serialize;

/// A chunk of captured audio. Ownership of the samples transfers with the
/// message; the sender must not touch them again.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub session: SessionId,
    pub seq: u64,
    /// Absolute sample offset of `samples[0]`.
    pub offset: u64,
    pub samples: Vec<f32>,
}

/// Unified message type for the audio-side stations.
#[derive(Debug, Clone)]
pub enum StreamMessage {
    /// Raw audio from the capture side.
    Audio(AudioChunk),
    /// Feature frames produced by the mel station.
    Features {
        session: SessionId,
        seq: u64,
        frames: Vec<MelFrame>,
    },
    /// Finalize the session's current segment.
    Flush { session: SessionId, seq: u64 },
    /// Tear the session down.
    Close { session: SessionId, seq: u64 },
}

impl StreamMessage {
    /// The session this message belongs to.
    pub fn session(&self) -> &SessionId {
        match self {
            StreamMessage::Audio(chunk) => &chunk.session,
            StreamMessage::Features { session, .. } => session,
            StreamMessage::Flush { session, .. } => session,
            StreamMessage::Close { session, .. } => session,
        }
    }

    /// The message's sequence number.
    pub fn seq(&self) -> u64 {
        match self {
            StreamMessage::Audio(chunk) => chunk.seq,
            StreamMessage::Features { seq, .. } => *seq,
            StreamMessage::Flush { seq, .. } => *seq,
            StreamMessage::Close { seq, .. } => *seq,
        }
    }
}

/// Transcript delta delivered to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEvent {
    pub session: SessionId,
    /// Segment the tokens belong to.
    pub segment: u32,
    /// Tokens appended by this event, oldest first. On a final event this is
    /// the complete token list of the flushed segment.
    pub tokens: Vec<TokenEvent>,
    /// True when the segment has been finalized.
    pub is_final: bool,
}
