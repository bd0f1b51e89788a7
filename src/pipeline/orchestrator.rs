//! Pipeline wiring: gate → mel → decode → sink, one thread each.
//!
//! The stations communicate over bounded channels and share nothing but the
//! session coordinator, which serializes per-session state access. Dropping
//! the handle's input side drains and stops every stage in order.

use crate::defaults;
use crate::error::{EngineError, Result};
use crate::pipeline::error::{ErrorReporter, StationError, StderrReporter};
use crate::pipeline::decode_station::DecodeStation;
use crate::pipeline::feature_station::FeatureStation;
use crate::pipeline::gate_station::GateStation;
use crate::pipeline::messages::{AudioChunk, StreamMessage, TranscriptEvent};
use crate::pipeline::sink::TranscriptSink;
use crate::pipeline::station::StationRunner;
use crate::runtime::adapter::JointNetwork;
use crate::session::coordinator::SessionCoordinator;
use crate::session::session::SessionId;
use crossbeam_channel::{Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

/// Builds and launches the station pipeline.
pub struct Pipeline<J: JointNetwork + 'static> {
    coordinator: Arc<SessionCoordinator<J>>,
    reporter: Arc<dyn ErrorReporter>,
    channel_capacity: usize,
}

impl<J: JointNetwork + 'static> Pipeline<J> {
    pub fn new(coordinator: Arc<SessionCoordinator<J>>) -> Self {
        Self {
            coordinator,
            reporter: Arc::new(StderrReporter),
            channel_capacity: defaults::CHANNEL_CAPACITY,
        }
    }

    /// Replaces the default stderr error reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Overrides the bounded channel capacity between stations.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Spawns the stations and the sink consumer; returns the feed handle.
    pub fn launch(self, mut sink: Box<dyn TranscriptSink>) -> PipelineHandle {
        let capacity = self.channel_capacity;
        let (input_tx, input_rx) = bounded::<StreamMessage>(capacity);
        let (gated_tx, gated_rx) = bounded::<StreamMessage>(capacity);
        let (features_tx, features_rx) = bounded::<StreamMessage>(capacity);
        let (events_tx, events_rx) = bounded::<TranscriptEvent>(capacity);

        let config = self.coordinator.config();
        let gate = GateStation::new(config.vad.clone(), config.audio.sample_rate);

        let runners = vec![
            StationRunner::spawn(gate, input_rx, gated_tx, self.reporter.clone()),
            StationRunner::spawn(
                FeatureStation::new(self.coordinator.clone()),
                gated_rx,
                features_tx,
                self.reporter.clone(),
            ),
            StationRunner::spawn(
                DecodeStation::new(self.coordinator.clone()),
                features_rx,
                events_tx,
                self.reporter.clone(),
            ),
        ];

        let reporter = self.reporter.clone();
        let sink_handle = std::thread::spawn(move || {
            while let Ok(event) = events_rx.recv() {
                if let Err(e) = sink.handle(&event) {
                    reporter.report(sink.name(), &StationError::Recoverable(e.to_string()));
                }
            }
        });

        PipelineHandle {
            input: input_tx,
            seq: AtomicU64::new(0),
            runners,
            sink_handle: Some(sink_handle),
        }
    }
}

/// Feed side of a running pipeline.
///
/// Messages are tagged with a monotonic sequence number; per-session order
/// is the order of calls on this handle.
pub struct PipelineHandle {
    input: Sender<StreamMessage>,
    seq: AtomicU64,
    runners: Vec<StationRunner>,
    sink_handle: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Feeds an audio chunk for a session. Ownership of the samples moves
    /// into the pipeline.
    pub fn feed_audio(&self, session: &SessionId, offset: u64, samples: Vec<f32>) -> Result<()> {
        self.send(StreamMessage::Audio(AudioChunk {
            session: session.clone(),
            seq: self.next_seq(),
            offset,
            samples,
        }))
    }

    /// Requests a segment flush for a session (explicit stop).
    pub fn flush_session(&self, session: &SessionId) -> Result<()> {
        self.send(StreamMessage::Flush {
            session: session.clone(),
            seq: self.next_seq(),
        })
    }

    /// Requests session teardown.
    pub fn close_session(&self, session: &SessionId) -> Result<()> {
        self.send(StreamMessage::Close {
            session: session.clone(),
            seq: self.next_seq(),
        })
    }

    /// Stops accepting input, drains the stations, and joins every thread.
    pub fn shutdown(mut self) -> std::result::Result<(), String> {
        drop(self.input);
        for runner in std::mem::take(&mut self.runners) {
            runner.join()?;
        }
        if let Some(handle) = self.sink_handle.take() {
            handle.join().map_err(|_| "sink thread panicked".to_string())?;
        }
        Ok(())
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    fn send(&self, message: StreamMessage) -> Result<()> {
        self.input.send(message).map_err(|_| EngineError::Audio {
            message: "pipeline has shut down".to_string(),
        })
    }
}
