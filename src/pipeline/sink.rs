//! Transcript event sinks for the presentation layer.
//!
//! The engine has no opinion about rendering; it hands `TranscriptEvent`s to
//! whatever sink the embedder wires in.

use crate::error::{EngineError, Result};
use crate::pipeline::messages::TranscriptEvent;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Pluggable transcript output handler.
pub trait TranscriptSink: Send + 'static {
    /// Handles one transcript event.
    fn handle(&mut self, event: &TranscriptEvent) -> Result<()>;

    /// Name for error reporting.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Collects events in memory; the shared handle outlives the pipeline.
pub struct CollectorSink {
    events: Arc<Mutex<Vec<TranscriptEvent>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared view of the collected events.
    pub fn events(&self) -> Arc<Mutex<Vec<TranscriptEvent>>> {
        self.events.clone()
    }
}

impl Default for CollectorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptSink for CollectorSink {
    fn handle(&mut self, event: &TranscriptEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Forwards events into an async channel (the message-passing boundary to
/// an async presentation layer).
pub struct ChannelSink {
    tx: tokio::sync::mpsc::Sender<TranscriptEvent>,
}

impl ChannelSink {
    /// Creates the sink and the receiving end for the consumer.
    pub fn new(capacity: usize) -> (Self, tokio::sync::mpsc::Receiver<TranscriptEvent>) {
        let (tx, rx) = tokio::sync::mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl TranscriptSink for ChannelSink {
    fn handle(&mut self, event: &TranscriptEvent) -> Result<()> {
        self.tx
            .blocking_send(event.clone())
            .map_err(|_| EngineError::EventDelivery {
                message: "event channel closed".to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W: Write + Send + 'static> {
    writer: W,
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send + 'static> TranscriptSink for JsonLinesSink<W> {
    fn handle(&mut self, event: &TranscriptEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event).map_err(|e| EngineError::EventDelivery {
            message: format!("json serialization failed: {e}"),
        })?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| EngineError::EventDelivery {
                message: format!("write failed: {e}"),
            })?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "json-lines"
    }
}
