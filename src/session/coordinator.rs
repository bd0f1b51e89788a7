//! Process-wide session table and per-session call serialization.
//!
//! The coordinator is the single entry point for `extend`/`decode` traffic.
//! Sessions live in an explicit table created on `open` and torn down on
//! `close` or idle timeout; there is no other process-wide state. Calls for
//! one session are serialized by a per-session lock, because the mel cache
//! and decoder state are not safe under concurrent writers; a second caller
//! simply waits. Closing a session lets an in-flight call finish and then
//! discards its result rather than aborting mid-computation.

use crate::config::Config;
use crate::decoder::state::{DecodeCheckpoint, TokenEvent};
use crate::decoder::transducer::TransducerDecoder;
use crate::error::{EngineError, Result};
use crate::features::mel::MelFrame;
use crate::runtime::adapter::{InferenceRuntime, JointNetwork};
use crate::session::session::{SessionId, TranscriptionSession};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Result of a serialized decode call, tagged with the session's segment.
#[derive(Debug, Clone)]
pub struct DecodeReport {
    pub appended: Vec<TokenEvent>,
    pub frames_accepted: usize,
    pub frames_consumed: u64,
    pub segment: u32,
}

/// Result of finalizing a segment.
#[derive(Debug, Clone)]
pub struct SegmentFlush {
    /// Every token the segment emitted, oldest first.
    pub tokens: Vec<TokenEvent>,
    /// Index of the segment that was flushed.
    pub segment: u32,
}

struct SessionSlot {
    inner: Mutex<TranscriptionSession>,
    closed: AtomicBool,
}

/// Maps logical sessions to their caches and serializes access per session.
pub struct SessionCoordinator<J: JointNetwork> {
    config: Config,
    runtime: Arc<InferenceRuntime<J>>,
    decoder: TransducerDecoder,
    sessions: Mutex<HashMap<SessionId, Arc<SessionSlot>>>,
}

impl<J: JointNetwork> SessionCoordinator<J> {
    pub fn new(config: Config, runtime: Arc<InferenceRuntime<J>>) -> Self {
        let decoder = TransducerDecoder::new(
            config.decoder.clone(),
            config.features.hop_size,
            config.audio.sample_rate,
        );
        Self {
            config,
            runtime,
            decoder,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn runtime(&self) -> &InferenceRuntime<J> {
        &self.runtime
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates a session. Fails if the id is already open.
    pub fn open(&self, id: SessionId) -> Result<()> {
        let mut sessions = lock(&self.sessions);
        if sessions.contains_key(&id) {
            return Err(EngineError::SessionAlreadyOpen { id: id.to_string() });
        }
        let session = TranscriptionSession::new(id.clone(), &self.config, &self.runtime);
        sessions.insert(
            id,
            Arc::new(SessionSlot {
                inner: Mutex::new(session),
                closed: AtomicBool::new(false),
            }),
        );
        Ok(())
    }

    /// Appends audio and returns the new feature frames.
    pub fn extend(&self, id: &SessionId, offset: u64, samples: &[f32]) -> Result<Vec<MelFrame>> {
        self.with_session(id, |session| session.extend(offset, samples))
    }

    /// Decodes feature frames as the continuation of the session's state.
    pub fn decode(&self, id: &SessionId, frames: &[MelFrame]) -> Result<DecodeReport> {
        self.with_session(id, |session| {
            session.last_activity = std::time::Instant::now();
            let outcome = self
                .decoder
                .decode(&self.runtime, &mut session.decoder_state, frames)?;
            session
                .checkpoints
                .push(DecodeCheckpoint::of(&session.decoder_state));
            Ok(DecodeReport {
                appended: outcome.appended,
                frames_accepted: outcome.frames_accepted,
                frames_consumed: outcome.frames_consumed,
                segment: session.segment,
            })
        })
    }

    /// Extend plus decode of the resulting frames under one lock hold.
    pub fn process(&self, id: &SessionId, offset: u64, samples: &[f32]) -> Result<DecodeReport> {
        self.with_session(id, |session| {
            let frames = session.extend(offset, samples)?;
            let outcome = self
                .decoder
                .decode(&self.runtime, &mut session.decoder_state, &frames)?;
            session
                .checkpoints
                .push(DecodeCheckpoint::of(&session.decoder_state));
            Ok(DecodeReport {
                appended: outcome.appended,
                frames_accepted: outcome.frames_accepted,
                frames_consumed: outcome.frames_consumed,
                segment: session.segment,
            })
        })
    }

    /// Finalizes the current segment: pads and decodes the stream tail,
    /// returns the segment's tokens, and starts the next segment fresh.
    pub fn flush_segment(&self, id: &SessionId) -> Result<SegmentFlush> {
        self.with_session(id, |session| {
            if let Some(frame) = session.extractor.flush()? {
                session.mel_cache.append(&[frame])?;
            }

            // Fold in anything extended but not yet decoded
            let pending: Vec<MelFrame> = session
                .mel_cache
                .frames_from(session.decoder_state.frames_consumed())
                .to_vec();
            let mut at = 0;
            while at < pending.len() {
                let outcome =
                    self.decoder
                        .decode(&self.runtime, &mut session.decoder_state, &pending[at..])?;
                if outcome.frames_accepted == 0 {
                    break;
                }
                at += outcome.frames_accepted;
            }

            let tokens = session.take_segment_tokens();
            let segment = session.segment;
            session.reset_segment(&self.runtime);
            Ok(SegmentFlush { tokens, segment })
        })
    }

    /// Discards the session's caches and decoder state without emitting.
    pub fn reset(&self, id: &SessionId) -> Result<()> {
        self.with_session(id, |session| {
            session.reset_segment(&self.runtime);
            Ok(())
        })
    }

    /// Restores the session to a retained checkpoint at the given prefix.
    pub fn rewind(&self, id: &SessionId, frames_consumed: u64) -> Result<()> {
        self.with_session(id, |session| {
            if session
                .checkpoints
                .rewind(frames_consumed, &mut session.decoder_state)
            {
                Ok(())
            } else {
                Err(EngineError::CacheContinuity {
                    expected: session.decoder_state.frames_consumed(),
                    got: frames_consumed,
                })
            }
        })
    }

    /// The session's current hypothesis: every token emitted in the open
    /// segment so far, oldest first.
    pub fn hypothesis(&self, id: &SessionId) -> Result<Vec<TokenEvent>> {
        self.with_session(id, |session| Ok(session.decoder_state.emitted().to_vec()))
    }

    /// The session's current resumable-prefix key.
    pub fn cache_key(&self, id: &SessionId) -> Result<crate::decoder::state::CacheKey> {
        self.with_session(id, |session| {
            Ok(session.decoder_state.cache_key(session.id.as_str()))
        })
    }

    /// Cached frames from the given index on, for re-decoding after rewind.
    pub fn cached_frames_from(&self, id: &SessionId, frame_index: u64) -> Result<Vec<MelFrame>> {
        self.with_session(id, |session| {
            Ok(session.mel_cache.frames_from(frame_index).to_vec())
        })
    }

    /// Closes a session, waiting out any in-flight call, and verifies the
    /// runtime holds no live tensors afterwards.
    pub fn close(&self, id: &SessionId) -> Result<()> {
        let slot = {
            let mut sessions = lock(&self.sessions);
            sessions
                .remove(id)
                .ok_or_else(|| EngineError::SessionNotFound { id: id.to_string() })?
        };
        slot.closed.store(true, Ordering::SeqCst);

        // An in-flight extend/decode finishes under this lock; its result is
        // discarded by the post-call closed check in with_session.
        drop(lock(&slot.inner));

        // Another session's step holds tensors only for the duration of that
        // call; let transient holders settle before declaring a leak.
        let mut retries = 0;
        while self.runtime.arena().live() != 0 && retries < 100 {
            std::thread::yield_now();
            retries += 1;
        }
        if self.runtime.arena().live() != 0 {
            return Err(EngineError::ResourceLeak {
                acquired: self.runtime.arena().total_acquired(),
                released: self.runtime.arena().total_released(),
            });
        }
        Ok(())
    }

    /// Closes every session idle longer than the configured timeout.
    pub fn sweep_idle(&self) -> Vec<SessionId> {
        self.sweep_idle_after(Duration::from_secs(self.config.session.idle_timeout_secs))
    }

    /// Closes every session idle longer than `max_idle`; returns their ids.
    ///
    /// A session with a call in flight holds its lock and is by definition
    /// not idle, so busy sessions are skipped rather than waited on.
    pub fn sweep_idle_after(&self, max_idle: Duration) -> Vec<SessionId> {
        let idle: Vec<SessionId> = {
            let sessions = lock(&self.sessions);
            sessions
                .iter()
                .filter_map(|(id, slot)| {
                    let session = slot.inner.try_lock().ok()?;
                    (session.idle_for() > max_idle).then(|| id.clone())
                })
                .collect()
        };
        idle.iter()
            .filter(|id| self.close(id).is_ok())
            .cloned()
            .collect()
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    fn with_session<T>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut TranscriptionSession) -> Result<T>,
    ) -> Result<T> {
        let slot = {
            let sessions = lock(&self.sessions);
            sessions
                .get(id)
                .cloned()
                .ok_or_else(|| EngineError::SessionNotFound { id: id.to_string() })?
        };

        let mut session = lock(&slot.inner);
        if slot.closed.load(Ordering::SeqCst) {
            return Err(EngineError::SessionClosed { id: id.to_string() });
        }
        let result = f(&mut session);
        if slot.closed.load(Ordering::SeqCst) {
            // Closed while we were computing: the result is discarded
            return Err(EngineError::SessionClosed { id: id.to_string() });
        }
        result
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
