//! Decode station: feature batches in, transcript events out.

use crate::pipeline::error::StationError;
use crate::pipeline::messages::{StreamMessage, TranscriptEvent};
use crate::pipeline::station::Station;
use crate::runtime::adapter::JointNetwork;
use crate::session::coordinator::SessionCoordinator;
use std::sync::Arc;

/// Hosts the decode loop: consumes feature batches and segment controls,
/// emits transcript deltas and finals to the presentation side.
pub struct DecodeStation<J: JointNetwork> {
    coordinator: Arc<SessionCoordinator<J>>,
}

impl<J: JointNetwork> DecodeStation<J> {
    pub fn new(coordinator: Arc<SessionCoordinator<J>>) -> Self {
        Self { coordinator }
    }
}

impl<J: JointNetwork + 'static> Station for DecodeStation<J> {
    type Input = StreamMessage;
    type Output = TranscriptEvent;

    fn name(&self) -> &'static str {
        "decode"
    }

    fn process(&mut self, input: StreamMessage) -> Result<Vec<TranscriptEvent>, StationError> {
        match input {
            StreamMessage::Features {
                session, frames, ..
            } => {
                let mut events = Vec::new();
                let mut at = 0;
                // The per-call frame bound may truncate; feed the remainder
                // until the batch is folded in.
                while at < frames.len() {
                    let report = self
                        .coordinator
                        .decode(&session, &frames[at..])
                        .map_err(StationError::from_engine)?;
                    if !report.appended.is_empty() {
                        events.push(TranscriptEvent {
                            session: session.clone(),
                            segment: report.segment,
                            tokens: report.appended,
                            is_final: false,
                        });
                    }
                    if report.frames_accepted == 0 {
                        break;
                    }
                    at += report.frames_accepted;
                }
                Ok(events)
            }
            StreamMessage::Flush { session, .. } => {
                let flush = self
                    .coordinator
                    .flush_segment(&session)
                    .map_err(StationError::from_engine)?;
                Ok(vec![TranscriptEvent {
                    session,
                    segment: flush.segment,
                    tokens: flush.tokens,
                    is_final: true,
                }])
            }
            StreamMessage::Close { session, .. } => {
                self.coordinator
                    .close(&session)
                    .map_err(StationError::from_engine)?;
                Ok(Vec::new())
            }
            StreamMessage::Audio(chunk) => Err(StationError::Recoverable(format!(
                "raw audio for session {} reached the decode station",
                chunk.session
            ))),
        }
    }
}
