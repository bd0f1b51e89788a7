//! Joint-network adapter.
//!
//! Owns the tensor lifecycle around every inference step: buffers are
//! acquired from the arena, the network only ever sees borrowed views, and
//! everything is released before the step returns on any path. The network
//! itself is opaque behind [`JointNetwork`]; the crate ships a deterministic
//! mock for tests and demos.

use crate::decoder::state::DecoderHidden;
use crate::error::{EngineError, Result};
use crate::runtime::tensor::{ArenaScope, TensorArena, TensorView, TensorViewMut};
use ndarray::Array3;
use std::sync::atomic::{AtomicU64, Ordering};

/// Borrowed inputs for one joint step.
pub struct JointInputs<'a> {
    /// One feature frame, `[mel_bins]`.
    pub frame: TensorView<'a>,
    /// Previously emitted token, or the blank id at segment start.
    pub last_token: i64,
    pub state_a: TensorView<'a>,
    pub state_b: TensorView<'a>,
}

/// Borrowed outputs for one joint step. The network writes, never allocates.
pub struct JointOutputs<'a> {
    /// `[vocab_size + 1]`, blank last.
    pub token_logits: TensorViewMut<'a>,
    /// `[duration_bins]`; empty for pure advance-by-one decoders.
    pub duration_logits: TensorViewMut<'a>,
    pub next_state_a: TensorViewMut<'a>,
    pub next_state_b: TensorViewMut<'a>,
}

/// The opaque prediction/joint network.
///
/// Implementations receive borrowed tensor views only; they cannot retain a
/// buffer past the step, which is what makes the adapter's release guarantee
/// hold by construction.
pub trait JointNetwork: Send + Sync {
    /// Vocabulary size excluding the blank symbol.
    fn vocab_size(&self) -> usize;

    /// Index of the blank symbol in the token logits (the last slot).
    fn blank_id(&self) -> usize {
        self.vocab_size()
    }

    /// Number of duration bins; 0 means the decoder advances one frame per
    /// blank like a plain transducer.
    fn duration_bins(&self) -> usize;

    /// Shape of each hidden-state tensor: `(layers, batch, width)`.
    fn state_dims(&self) -> (usize, usize, usize);

    /// Runs one step, reading `inputs` and filling every view in `outputs`.
    fn step(&self, inputs: JointInputs<'_>, outputs: JointOutputs<'_>) -> Result<()>;
}

/// Plain-data result of one adapted step; no tensor survives into it.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub token_logits: Vec<f32>,
    pub duration_logits: Vec<f32>,
    pub hidden: DecoderHidden,
}

/// Tensor-lifecycle wrapper around a [`JointNetwork`].
pub struct InferenceRuntime<J: JointNetwork> {
    joint: J,
    arena: TensorArena,
}

impl<J: JointNetwork> InferenceRuntime<J> {
    pub fn new(joint: J) -> Self {
        Self {
            joint,
            arena: TensorArena::new(),
        }
    }

    pub fn joint(&self) -> &J {
        &self.joint
    }

    pub fn arena(&self) -> &TensorArena {
        &self.arena
    }

    /// Zeroed hidden state for a fresh segment.
    pub fn init_hidden(&self) -> DecoderHidden {
        DecoderHidden::zeros(self.joint.state_dims())
    }

    /// Blank token id as the decoder's `last_token` sentinel.
    pub fn blank_token(&self) -> i64 {
        self.joint.blank_id() as i64
    }

    /// Runs one joint step with scoped tensor acquisition.
    ///
    /// Every tensor acquired for the step is released before this returns,
    /// whether the network succeeds or fails; the scope's balance is
    /// verified afterwards and a mismatch is an unrecoverable accounting
    /// fault.
    pub fn step(&self, frame: &[f32], last_token: i64, hidden: &DecoderHidden) -> Result<StepOutput> {
        let scope = self.arena.scope();
        let result = self.step_scoped(&scope, frame, last_token, hidden);
        if !scope.is_balanced() {
            debug_assert!(
                scope.is_balanced(),
                "tensor accounting mismatch after inference step"
            );
            return Err(EngineError::ResourceLeak {
                acquired: scope.acquired(),
                released: scope.released(),
            });
        }
        result
    }

    fn step_scoped(
        &self,
        scope: &ArenaScope<'_>,
        frame: &[f32],
        last_token: i64,
        hidden: &DecoderHidden,
    ) -> Result<StepOutput> {
        let (layers, batch, width) = self.joint.state_dims();
        let state_shape = [layers, batch, width];
        let vocab = self.joint.vocab_size();
        let durations = self.joint.duration_bins();

        let mut frame_in = scope.acquire(&[frame.len()]);
        frame_in.as_mut_slice().copy_from_slice(frame);

        let mut state_a_in = scope.acquire(&state_shape);
        fill_from_array(state_a_in.as_mut_slice(), &hidden.state_a)?;
        let mut state_b_in = scope.acquire(&state_shape);
        fill_from_array(state_b_in.as_mut_slice(), &hidden.state_b)?;

        let mut token_logits = scope.acquire(&[vocab + 1]);
        let mut duration_logits = scope.acquire(&[durations]);
        let mut state_a_out = scope.acquire(&state_shape);
        let mut state_b_out = scope.acquire(&state_shape);

        self.joint.step(
            JointInputs {
                frame: frame_in.view(),
                last_token,
                state_a: state_a_in.view(),
                state_b: state_b_in.view(),
            },
            JointOutputs {
                token_logits: token_logits.view_mut(),
                duration_logits: duration_logits.view_mut(),
                next_state_a: state_a_out.view_mut(),
                next_state_b: state_b_out.view_mut(),
            },
        )?;

        let dims = (layers, batch, width);
        let hidden = DecoderHidden {
            state_a: array_from_slice(state_a_out.as_slice(), dims)?,
            state_b: array_from_slice(state_b_out.as_slice(), dims)?,
        };

        Ok(StepOutput {
            token_logits: token_logits.as_slice().to_vec(),
            duration_logits: duration_logits.as_slice().to_vec(),
            hidden,
        })
        // All tensors drop here; on the error paths above they drop the same way.
    }

}

fn fill_from_array(dst: &mut [f32], src: &Array3<f32>) -> Result<()> {
    if dst.len() != src.len() {
        return Err(EngineError::Inference {
            message: format!(
                "hidden state shape mismatch: expected {} values, got {}",
                dst.len(),
                src.len()
            ),
        });
    }
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d = *s;
    }
    Ok(())
}

fn array_from_slice(src: &[f32], dims: (usize, usize, usize)) -> Result<Array3<f32>> {
    Array3::from_shape_vec(dims, src.to_vec()).map_err(|e| EngineError::Inference {
        message: format!("malformed state tensor: {e}"),
    })
}

/// How the mock decides between emitting and advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmitPolicy {
    /// Emit one token whenever the quantized peak frame energy differs from
    /// the level recorded at the previous emission. Default.
    EnergyTransition,
    /// Emit on every step; exercises the per-frame emission cap.
    AlwaysEmit,
    /// Never emit.
    NeverEmit,
    /// Score emit and advance exactly equal; exercises the tie-break.
    TieScores,
}

/// Deterministic scripted network for tests and demos.
///
/// Replays of the same frame sequence produce the same tokens; there is no
/// randomness and no dependence on wall-clock or call timing.
pub struct MockJoint {
    vocab_size: usize,
    duration_bins: usize,
    state_dims: (usize, usize, usize),
    policy: EmitPolicy,
    /// Duration bin favoured when emitting.
    emit_duration: usize,
    /// Peak log-mel level below which a frame counts as silence.
    silence_floor: f32,
    fail_on_call: Option<u64>,
    calls: AtomicU64,
}

impl MockJoint {
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            duration_bins: 5,
            state_dims: (1, 1, 8),
            policy: EmitPolicy::EnergyTransition,
            emit_duration: 0,
            silence_floor: -12.0,
            fail_on_call: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Emit on every step, never blank.
    pub fn with_always_emit(mut self) -> Self {
        self.policy = EmitPolicy::AlwaysEmit;
        self
    }

    /// Never emit a token.
    pub fn with_never_emit(mut self) -> Self {
        self.policy = EmitPolicy::NeverEmit;
        self
    }

    /// Score emission and advance exactly equal on every step.
    pub fn with_tie_scores(mut self) -> Self {
        self.policy = EmitPolicy::TieScores;
        self
    }

    /// Favour this duration bin when emitting (frames to jump).
    pub fn with_emit_duration(mut self, duration: usize) -> Self {
        self.emit_duration = duration;
        self
    }

    /// Fail the n-th step call (1-based) with an inference error.
    pub fn with_failure_on_call(mut self, call: u64) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Number of step calls observed so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl JointNetwork for MockJoint {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn duration_bins(&self) -> usize {
        self.duration_bins
    }

    fn state_dims(&self) -> (usize, usize, usize) {
        self.state_dims
    }

    fn step(&self, inputs: JointInputs<'_>, outputs: JointOutputs<'_>) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(EngineError::Inference {
                message: format!("mock failure injected on call {call}"),
            });
        }

        let blank = self.vocab_size;
        let frame = inputs.frame.data;
        // Peak log-mel bin; a narrowband tone leaves most bins near the log
        // guard, so the mean would misread it as silence.
        let peak_energy = frame
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);

        // Next state starts as a copy of the current one
        outputs.next_state_a.data.copy_from_slice(inputs.state_a.data);
        outputs.next_state_b.data.copy_from_slice(inputs.state_b.data);

        outputs.token_logits.data.fill(0.0);
        outputs.duration_logits.data.fill(0.0);

        let emitting = match self.policy {
            EmitPolicy::NeverEmit => {
                outputs.token_logits.data[blank] = 2.0;
                false
            }
            EmitPolicy::TieScores => {
                let token = 5 % self.vocab_size;
                outputs.token_logits.data[token] = 1.5;
                outputs.token_logits.data[blank] = 1.5;
                false
            }
            EmitPolicy::AlwaysEmit => {
                let token = (inputs.last_token as usize + 1) % self.vocab_size;
                outputs.token_logits.data[token] = 3.0;
                outputs.next_state_a.data[0] += 1.0;
                true
            }
            EmitPolicy::EnergyTransition => {
                let level = peak_energy.round();
                let stored = inputs.state_a.data[0];
                if peak_energy > self.silence_floor && level != stored {
                    let token = level.abs() as usize % self.vocab_size;
                    outputs.token_logits.data[token] = 3.0;
                    outputs.token_logits.data[blank] = 1.0;
                    outputs.next_state_a.data[0] = level;
                    true
                } else {
                    outputs.token_logits.data[blank] = 2.0;
                    false
                }
            }
        };

        if !outputs.duration_logits.data.is_empty() {
            let favoured = if emitting { self.emit_duration } else { 0 };
            let favoured = favoured.min(outputs.duration_logits.data.len() - 1);
            outputs.duration_logits.data[favoured] = 3.0;
        }

        Ok(())
    }
}
