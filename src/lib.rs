//! streamscribe - incremental streaming speech-to-text engine
//!
//! Audio arrives as a continuous stream of chunks and becomes a
//! continuously-extending transcript: an incremental mel frontend computes
//! only the feature frames whose windows became available, and a
//! token-and-duration transducer decode loop grows the hypothesis from the
//! hidden state left by the previous call. The neural network is an opaque
//! [`JointNetwork`]; tensor buffers around it are pooled and
//! release-verified per call.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod config;
pub mod decoder;
pub mod defaults;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod runtime;
pub mod session;

// Core engine surface
pub use config::Config;
pub use error::{EngineError, Result};
pub use session::coordinator::{DecodeReport, SegmentFlush, SessionCoordinator};
pub use session::session::SessionId;

// Audio-side collaborators
pub use audio::buffer::RingAudioBuffer;
pub use audio::vad::{GateEvent, VoiceGate};

// Feature frontend
pub use features::mel::{MelExtractor, MelFrame};

// Decoder
pub use decoder::state::{CacheKey, DecoderState, SegmentPhase, TokenEvent};
pub use decoder::transducer::{DecodeOutcome, TransducerDecoder};

// Inference runtime
pub use runtime::adapter::{InferenceRuntime, JointNetwork, MockJoint, StepOutput};
pub use runtime::tensor::{ArenaScope, Tensor, TensorArena, TensorView, TensorViewMut};

// Pipeline (source → stations → sink)
pub use pipeline::messages::TranscriptEvent;
pub use pipeline::orchestrator::{Pipeline, PipelineHandle};
pub use pipeline::sink::{ChannelSink, CollectorSink, JsonLinesSink, TranscriptSink};

// Station framework (for embedders adding their own stages)
pub use pipeline::error::{ErrorReporter, StationError};
pub use pipeline::station::Station;
