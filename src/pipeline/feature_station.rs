//! Mel extraction station.

use crate::pipeline::error::StationError;
use crate::pipeline::messages::StreamMessage;
use crate::pipeline::station::Station;
use crate::runtime::adapter::JointNetwork;
use crate::session::coordinator::SessionCoordinator;
use std::sync::Arc;

/// Turns audio chunks into feature batches via the session coordinator.
///
/// Extraction happens under the session's lock inside `extend`, so this
/// station and any direct coordinator callers stay serialized per session.
pub struct FeatureStation<J: JointNetwork> {
    coordinator: Arc<SessionCoordinator<J>>,
}

impl<J: JointNetwork> FeatureStation<J> {
    pub fn new(coordinator: Arc<SessionCoordinator<J>>) -> Self {
        Self { coordinator }
    }
}

impl<J: JointNetwork + 'static> Station for FeatureStation<J> {
    type Input = StreamMessage;
    type Output = StreamMessage;

    fn name(&self) -> &'static str {
        "mel"
    }

    fn process(&mut self, input: StreamMessage) -> Result<Vec<StreamMessage>, StationError> {
        match input {
            StreamMessage::Audio(chunk) => {
                let frames = self
                    .coordinator
                    .extend(&chunk.session, chunk.offset, &chunk.samples)
                    .map_err(StationError::from_engine)?;
                if frames.is_empty() {
                    // Not enough buffered audio for a window yet
                    return Ok(Vec::new());
                }
                Ok(vec![StreamMessage::Features {
                    session: chunk.session,
                    seq: chunk.seq,
                    frames,
                }])
            }
            other => Ok(vec![other]),
        }
    }
}
