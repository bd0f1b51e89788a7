//! Incremental token-and-duration transducer decode loop.
//!
//! Consumes feature frames in order and grows the emitted-token hypothesis,
//! resuming from the hidden state left by the previous call. For each frame
//! the joint network scores "emit a token" against "advance"; emission stays
//! on the frame (bounded per frame), blank advances, and a positive duration
//! output jumps several frames at once. Following the reference decoder, the
//! hidden state advances only when a token is emitted.
//!
//! A call mutates nothing until it has fully succeeded: the loop runs on a
//! working copy of the state, so an inference failure leaves the pre-call
//! state valid and the same input retryable.

use crate::config::DecoderConfig;
use crate::decoder::state::{DecoderState, SegmentPhase, TokenEvent};
use crate::error::{EngineError, Result};
use crate::features::mel::MelFrame;
use crate::runtime::adapter::{InferenceRuntime, JointNetwork};

/// Result of one decode call.
#[derive(Debug, Clone)]
pub struct DecodeOutcome {
    /// Tokens appended by this call, oldest first.
    pub appended: Vec<TokenEvent>,
    /// Frames folded into the state by this call. May be less than the
    /// frames supplied when the per-call bound truncates; resubmit the rest.
    pub frames_accepted: usize,
    /// Absolute index of the next frame the session now expects.
    pub frames_consumed: u64,
}

/// The decode loop; stateless itself, operating on a session's
/// [`DecoderState`].
pub struct TransducerDecoder {
    config: DecoderConfig,
    hop_size: usize,
    sample_rate: u32,
}

impl TransducerDecoder {
    pub fn new(config: DecoderConfig, hop_size: usize, sample_rate: u32) -> Self {
        Self {
            config,
            hop_size,
            sample_rate,
        }
    }

    /// Decodes new feature frames as the continuation of `state`.
    ///
    /// The first frame must sit exactly at the state's recorded prefix and
    /// the batch must be hop-contiguous, else `CacheContinuity` is returned
    /// and the state is untouched.
    pub fn decode<J: JointNetwork>(
        &self,
        runtime: &InferenceRuntime<J>,
        state: &mut DecoderState,
        frames: &[MelFrame],
    ) -> Result<DecodeOutcome> {
        if frames.is_empty() {
            return Ok(DecodeOutcome {
                appended: Vec::new(),
                frames_accepted: 0,
                frames_consumed: state.frames_consumed,
            });
        }

        let first = frames[0].index(self.hop_size);
        if first != state.frames_consumed {
            return Err(EngineError::CacheContinuity {
                expected: state.frames_consumed,
                got: first,
            });
        }
        for (i, frame) in frames.iter().enumerate() {
            let expected = first + i as u64;
            let got = frame.index(self.hop_size);
            if got != expected {
                return Err(EngineError::CacheContinuity { expected, got });
            }
        }

        let accepted = frames.len().min(self.config.max_frames_per_call);
        let batch = &frames[..accepted];

        // Working copies; committed only on success
        let mut hidden = state.hidden.clone();
        let mut last_token = state.last_token;
        let mut appended: Vec<TokenEvent> = Vec::new();

        // A duration jump from the previous call may already cover part or
        // all of this batch.
        let (mut t, leftover_skip) = if state.skip_ahead >= accepted as u64 {
            (accepted, state.skip_ahead - accepted as u64)
        } else {
            (state.skip_ahead as usize, 0)
        };

        let mut emitted_on_frame = 0u32;
        while t < accepted {
            let step = runtime.step(&batch[t].values, last_token, &hidden)?;

            let vocab = step.token_logits.len() - 1;
            let blank_score = step.token_logits[vocab];
            let (best_token, best_score) = argmax(&step.token_logits[..vocab]);
            let duration = if step.duration_logits.is_empty() {
                0
            } else {
                argmax(&step.duration_logits).0
            };

            if blank_score >= best_score {
                // Advance wins exact ties so degenerate scoring cannot pin
                // the loop to one frame. Hidden state is not adopted.
                t += duration.max(1);
                emitted_on_frame = 0;
            } else {
                let frame_index = batch[t].index(self.hop_size);
                appended.push(TokenEvent {
                    token: best_token as u32,
                    frame_index,
                    time_secs: (frame_index * self.hop_size as u64) as f32
                        / self.sample_rate as f32,
                    confidence: softmax_probability(&step.token_logits, best_token),
                });
                last_token = best_token as i64;
                hidden = step.hidden;
                emitted_on_frame += 1;

                if duration > 0 {
                    t += duration;
                    emitted_on_frame = 0;
                } else if emitted_on_frame >= self.config.max_tokens_per_frame {
                    t += 1;
                    emitted_on_frame = 0;
                }
            }
        }

        // Commit
        let overshoot = (t - accepted) as u64;
        state.hidden = hidden;
        state.last_token = last_token;
        state.emitted.extend(appended.iter().cloned());
        state.frames_consumed = first + accepted as u64;
        state.skip_ahead = leftover_skip + overshoot;
        state.phase = SegmentPhase::Decoding;

        Ok(DecodeOutcome {
            appended,
            frames_accepted: accepted,
            frames_consumed: state.frames_consumed,
        })
    }
}

fn argmax(scores: &[f32]) -> (usize, f32) {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (i, &score) in scores.iter().enumerate() {
        if score > best_score {
            best = i;
            best_score = score;
        }
    }
    (best, best_score)
}

/// Softmax probability of `index` over the full logit vector.
fn softmax_probability(logits: &[f32], index: usize) -> f32 {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let denom: f32 = logits.iter().map(|&s| (s - max).exp()).sum();
    (logits[index] - max).exp() / denom
}
