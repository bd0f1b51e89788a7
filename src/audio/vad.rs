//! Voice activity gate.
//!
//! RMS-based speech/silence classification with a state machine that turns a
//! sustained silence run into a segment-end event. Time is measured in
//! samples rather than wall-clock so the gate is deterministic and replayable
//! for the same audio.

use crate::config::VadConfig;

/// Current state of the voice activity gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No speech observed since the last segment boundary.
    Idle,
    /// Speech is being observed.
    Speaking,
    /// Silence after speech, waiting out the hangover.
    Hangover,
}

/// Events emitted by the gate, one per processed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    /// Speech started after idle or a segment boundary.
    SpeechStart,
    /// Ongoing speech.
    Speech,
    /// Silence, no boundary yet.
    Silence,
    /// Sustained silence after speech: the segment should be flushed.
    SegmentEnd,
}

/// Voice activity gate state machine.
pub struct VoiceGate {
    config: VadConfig,
    sample_rate: u32,
    state: GateState,
    /// Samples of uninterrupted silence while in hangover.
    silence_samples: u64,
}

impl VoiceGate {
    pub fn new(config: VadConfig, sample_rate: u32) -> Self {
        Self {
            config,
            sample_rate,
            state: GateState::Idle,
            silence_samples: 0,
        }
    }

    /// Classifies one window of samples and advances the state machine.
    pub fn process(&mut self, samples: &[f32]) -> GateEvent {
        let is_speech = rms(samples) > self.config.threshold;
        let hangover_samples =
            self.sample_rate as u64 * self.config.silence_hangover_ms as u64 / 1000;

        match self.state {
            GateState::Idle => {
                if is_speech {
                    self.state = GateState::Speaking;
                    GateEvent::SpeechStart
                } else {
                    GateEvent::Silence
                }
            }
            GateState::Speaking => {
                if is_speech {
                    GateEvent::Speech
                } else {
                    self.state = GateState::Hangover;
                    self.silence_samples = samples.len() as u64;
                    if self.silence_samples >= hangover_samples {
                        self.state = GateState::Idle;
                        self.silence_samples = 0;
                        GateEvent::SegmentEnd
                    } else {
                        GateEvent::Silence
                    }
                }
            }
            GateState::Hangover => {
                if is_speech {
                    self.state = GateState::Speaking;
                    self.silence_samples = 0;
                    GateEvent::Speech
                } else {
                    self.silence_samples += samples.len() as u64;
                    if self.silence_samples >= hangover_samples {
                        self.state = GateState::Idle;
                        self.silence_samples = 0;
                        GateEvent::SegmentEnd
                    } else {
                        GateEvent::Silence
                    }
                }
            }
        }
    }

    /// Returns the current gate state.
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Returns the gate to idle, forgetting any partial silence run.
    pub fn reset(&mut self) {
        self.state = GateState::Idle;
        self.silence_samples = 0;
    }
}

/// Root-mean-square level of a sample window, 0.0 for an empty window.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum();
    (energy / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> VoiceGate {
        VoiceGate::new(
            VadConfig {
                threshold: 0.02,
                silence_hangover_ms: 100,
            },
            16000,
        )
    }

    fn speech_window(len: usize) -> Vec<f32> {
        vec![0.25; len]
    }

    fn silence_window(len: usize) -> Vec<f32> {
        vec![0.0; len]
    }

    #[test]
    fn test_rms_of_silence_is_zero() {
        assert_eq!(rms(&silence_window(160)), 0.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_idle_until_speech() {
        let mut gate = gate();
        assert_eq!(gate.process(&silence_window(160)), GateEvent::Silence);
        assert_eq!(gate.state(), GateState::Idle);

        assert_eq!(gate.process(&speech_window(160)), GateEvent::SpeechStart);
        assert_eq!(gate.state(), GateState::Speaking);
    }

    #[test]
    fn test_segment_end_after_hangover() {
        let mut gate = gate();
        gate.process(&speech_window(160));

        // 100ms hangover = 1600 samples at 16kHz; ten 160-sample windows
        for _ in 0..9 {
            assert_ne!(gate.process(&silence_window(160)), GateEvent::SegmentEnd);
        }
        assert_eq!(gate.process(&silence_window(160)), GateEvent::SegmentEnd);
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[test]
    fn test_speech_resumes_during_hangover() {
        let mut gate = gate();
        gate.process(&speech_window(160));
        gate.process(&silence_window(160));
        assert_eq!(gate.state(), GateState::Hangover);

        assert_eq!(gate.process(&speech_window(160)), GateEvent::Speech);
        assert_eq!(gate.state(), GateState::Speaking);

        // The silence run restarts from zero
        for _ in 0..9 {
            assert_ne!(gate.process(&silence_window(160)), GateEvent::SegmentEnd);
        }
        assert_eq!(gate.process(&silence_window(160)), GateEvent::SegmentEnd);
    }

    #[test]
    fn test_deterministic_replay() {
        let windows: Vec<Vec<f32>> = (0..20)
            .map(|i| {
                if i % 3 == 0 {
                    speech_window(160)
                } else {
                    silence_window(160)
                }
            })
            .collect();

        let run = |windows: &[Vec<f32>]| -> Vec<GateEvent> {
            let mut gate = gate();
            windows.iter().map(|w| gate.process(w)).collect()
        };

        assert_eq!(run(&windows), run(&windows));
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut gate = gate();
        gate.process(&speech_window(160));
        gate.process(&silence_window(160));
        gate.reset();

        assert_eq!(gate.state(), GateState::Idle);
        assert_eq!(gate.process(&speech_window(160)), GateEvent::SpeechStart);
    }
}
