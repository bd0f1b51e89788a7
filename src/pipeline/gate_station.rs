//! Voice-activity station: turns sustained silence into segment flushes.

use crate::audio::vad::{GateEvent, VoiceGate};
use crate::config::VadConfig;
use crate::pipeline::error::StationError;
use crate::pipeline::messages::StreamMessage;
use crate::pipeline::station::Station;
use crate::session::session::SessionId;
use std::collections::HashMap;

/// Annotates the audio stream with segment boundaries.
///
/// Audio passes through unchanged; when a session's gate sees a silence run
/// longer than the configured hangover, a `Flush` for that session is
/// appended after the chunk that completed the run. One gate per session,
/// dropped when the session closes.
pub struct GateStation {
    config: VadConfig,
    sample_rate: u32,
    gates: HashMap<SessionId, VoiceGate>,
}

impl GateStation {
    pub fn new(config: VadConfig, sample_rate: u32) -> Self {
        Self {
            config,
            sample_rate,
            gates: HashMap::new(),
        }
    }
}

impl Station for GateStation {
    type Input = StreamMessage;
    type Output = StreamMessage;

    fn name(&self) -> &'static str {
        "gate"
    }

    fn process(&mut self, input: StreamMessage) -> Result<Vec<StreamMessage>, StationError> {
        match input {
            StreamMessage::Audio(chunk) => {
                let gate = self
                    .gates
                    .entry(chunk.session.clone())
                    .or_insert_with(|| VoiceGate::new(self.config.clone(), self.sample_rate));

                let event = gate.process(&chunk.samples);
                let session = chunk.session.clone();
                let seq = chunk.seq;

                let mut out = vec![StreamMessage::Audio(chunk)];
                if event == GateEvent::SegmentEnd {
                    out.push(StreamMessage::Flush { session, seq });
                }
                Ok(out)
            }
            StreamMessage::Close { session, seq } => {
                self.gates.remove(&session);
                Ok(vec![StreamMessage::Close { session, seq }])
            }
            other => Ok(vec![other]),
        }
    }
}
