//! Default configuration constants for streamscribe.
//!
//! Shared constants used across configuration types so the feature frontend,
//! decoder, and pipeline stay mutually consistent.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and matches the frontend
/// the transducer models in this family are trained with.
pub const SAMPLE_RATE: u32 = 16_000;

/// FFT size for the mel frontend.
pub const FFT_SIZE: usize = 512;

/// Analysis window length in samples (25ms at 16kHz).
///
/// Shorter than [`FFT_SIZE`]; each windowed frame is zero-padded to the FFT
/// size before transforming.
pub const WINDOW_SIZE: usize = 400;

/// Hop between successive analysis windows in samples (10ms at 16kHz).
pub const HOP_SIZE: usize = 160;

/// Number of mel filterbank bins per feature frame.
pub const MEL_BINS: usize = 128;

/// Pre-emphasis coefficient applied before the STFT.
pub const PREEMPHASIS: f32 = 0.97;

/// Additive guard before the log so silent frames stay finite.
///
/// 2^-24, the smallest normal step of a float32 mantissa at 1.0; the same
/// guard the reference frontend uses.
pub const LOG_GUARD: f32 = 5.960_464_5e-8;

/// Lower edge of the mel filterbank in Hz.
pub const MEL_FREQ_MIN: f32 = 0.0;

/// Upper edge of the mel filterbank in Hz (Nyquist at 16kHz).
pub const MEL_FREQ_MAX: f32 = 8_000.0;

/// Maximum tokens the decoder may emit while holding on a single frame.
///
/// Degenerate inputs can make the joint network favour emission forever;
/// after this many symbols the loop force-advances to the next frame.
pub const MAX_TOKENS_PER_FRAME: u32 = 10;

/// Maximum feature frames a single decode call will consume.
///
/// 1000 frames is 10s of audio. Longer batches are accepted but truncated;
/// the outcome reports how many frames were folded in so the caller can
/// resubmit the rest.
pub const MAX_FRAMES_PER_CALL: usize = 1_000;

/// Number of decode checkpoints retained per session for rewind.
pub const CHECKPOINT_DEPTH: usize = 4;

/// Default RMS threshold for the voice activity gate (0.0 to 1.0).
pub const VAD_THRESHOLD: f32 = 0.02;

/// Silence run length in milliseconds that ends a speech segment.
pub const SILENCE_HANGOVER_MS: u32 = 600;

/// Sessions with no extend/decode activity for this long are torn down.
pub const IDLE_TIMEOUT_SECS: u64 = 300;

/// Bounded capacity of the station channels in the pipeline.
pub const CHANNEL_CAPACITY: usize = 64;

/// Maximum audio history the ring buffer retains, in seconds.
pub const RING_BUFFER_SECS: u64 = 300;
