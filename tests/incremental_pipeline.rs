//! End-to-end properties of the incremental extract/decode path.

use std::sync::Arc;
use streamscribe::{
    Config, EngineError, InferenceRuntime, MockJoint, RingAudioBuffer, SessionCoordinator,
    SessionId, TokenEvent,
};

fn coordinator() -> SessionCoordinator<MockJoint> {
    SessionCoordinator::new(
        Config::default(),
        Arc::new(InferenceRuntime::new(MockJoint::new(32))),
    )
}

fn coordinator_with(joint: MockJoint) -> SessionCoordinator<MockJoint> {
    SessionCoordinator::new(Config::default(), Arc::new(InferenceRuntime::new(joint)))
}

/// Synthetic tone, phase-continuous across chunk boundaries.
fn sine(len: usize, offset: usize, freq: f32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let n = (offset + i) as f32;
            (2.0 * std::f32::consts::PI * freq * n / 16000.0).sin() * 0.5
        })
        .collect()
}

/// Deterministic noise from a linear congruential generator.
fn noise(len: usize, mut seed: u32) -> Vec<f32> {
    (0..len)
        .map(|_| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (seed >> 16) as f32 / 32768.0 - 1.0
        })
        .collect()
}

/// Runs a full stream through a fresh session, with the audio split at the
/// given points, and returns (mel frame count, final token list).
fn run_split(
    coordinator: &SessionCoordinator<MockJoint>,
    name: &str,
    audio: &[f32],
    chunk_lens: &[usize],
) -> (usize, Vec<TokenEvent>) {
    let id = SessionId::from(name);
    coordinator.open(id.clone()).unwrap();

    let mut frame_count = 0;
    let mut offset = 0usize;
    for &len in chunk_lens {
        let end = (offset + len).min(audio.len());
        let frames = coordinator.extend(&id, offset as u64, &audio[offset..end]).unwrap();
        frame_count += frames.len();
        coordinator.decode(&id, &frames).unwrap();
        offset = end;
    }
    assert_eq!(offset, audio.len(), "split must cover the whole stream");

    let flush = coordinator.flush_segment(&id).unwrap();
    coordinator.close(&id).unwrap();
    (frame_count, flush.tokens)
}

#[test]
fn replaying_a_stream_yields_identical_frames_and_tokens() {
    let mut audio = sine(24000, 0, 440.0);
    audio.extend(noise(8000, 42).iter().map(|s| s * 0.3));

    let a = coordinator();
    let b = coordinator();

    let id = SessionId::from("replay");
    a.open(id.clone()).unwrap();
    b.open(id.clone()).unwrap();

    let frames_a = a.extend(&id, 0, &audio).unwrap();
    let frames_b = b.extend(&id, 0, &audio).unwrap();
    assert_eq!(frames_a, frames_b, "mel frames must be byte-identical");

    let report_a = a.decode(&id, &frames_a).unwrap();
    let report_b = b.decode(&id, &frames_b).unwrap();
    assert_eq!(report_a.appended, report_b.appended);
}

#[test]
fn three_second_tone_six_splits_equals_one_call() {
    let audio = sine(48000, 0, 440.0); // 3s

    let (frames_once, tokens_once) = run_split(&coordinator(), "once", &audio, &[48000]);
    let (frames_six, tokens_six) =
        run_split(&coordinator(), "six", &audio, &[8000; 6]); // six 0.5s calls

    assert_eq!(frames_once, frames_six);
    assert_eq!(tokens_once, tokens_six);
}

#[test]
fn arbitrary_splits_agree_with_batch() {
    let mut audio = sine(16000, 0, 440.0);
    audio.extend(sine(16000, 16000, 880.0));

    let (frames_batch, tokens_batch) = run_split(&coordinator(), "batch", &audio, &[32000]);
    let (frames_split, tokens_split) = run_split(
        &coordinator(),
        "ragged",
        &audio,
        &[1, 399, 1600, 12000, 3000, 11000, 4000],
    );

    assert_eq!(frames_batch, frames_split);
    assert_eq!(tokens_batch, tokens_split);
}

#[test]
fn decode_respects_max_tokens_per_frame_on_degenerate_input() {
    // A joint that always wants to emit, driven by adversarial inputs
    for audio in [noise(16000, 7), vec![0.0f32; 16000]] {
        let coordinator = coordinator_with(MockJoint::new(32).with_always_emit());
        let id = SessionId::from("degenerate");
        coordinator.open(id.clone()).unwrap();

        let frames = coordinator.extend(&id, 0, &audio).unwrap();
        let report = coordinator.decode(&id, &frames).unwrap();

        let max_per_frame = Config::default().decoder.max_tokens_per_frame as usize;
        for index in 0..frames.len() as u64 {
            let on_frame = report
                .appended
                .iter()
                .filter(|t| t.frame_index == index)
                .count();
            assert!(
                on_frame <= max_per_frame,
                "frame {index} got {on_frame} tokens"
            );
        }
        coordinator.close(&id).unwrap();
    }
}

#[test]
fn frame_gap_raises_continuity_error_and_preserves_state() {
    let coordinator = coordinator();
    let id = SessionId::from("gap");
    coordinator.open(id.clone()).unwrap();

    let frames = coordinator.extend(&id, 0, &sine(16000, 0, 440.0)).unwrap();
    coordinator.decode(&id, &frames[..40]).unwrap();
    let key_before = coordinator.cache_key(&id).unwrap();

    // Skip frames 40..42
    let result = coordinator.decode(&id, &frames[42..]);
    assert!(matches!(
        result,
        Err(EngineError::CacheContinuity {
            expected: 40,
            got: 42
        })
    ));

    // State unchanged; the direct continuation still decodes
    assert_eq!(coordinator.cache_key(&id).unwrap(), key_before);
    coordinator.decode(&id, &frames[40..]).unwrap();
    coordinator.close(&id).unwrap();
}

#[test]
fn reset_discards_decoder_state_and_tokens() {
    let coordinator = coordinator();
    let id = SessionId::from("reset");
    coordinator.open(id.clone()).unwrap();

    let report = coordinator.process(&id, 0, &sine(16000, 0, 440.0)).unwrap();
    assert!(!report.appended.is_empty());
    assert_eq!(coordinator.hypothesis(&id).unwrap(), report.appended);

    coordinator.reset(&id).unwrap();
    assert!(coordinator.hypothesis(&id).unwrap().is_empty());

    // The next segment starts from Idle: nothing carried over, and tokens
    // emitted before the reset do not reappear.
    let report = coordinator
        .process(&id, 16000, &sine(16000, 16000, 440.0))
        .unwrap();
    assert_eq!(report.segment, 1);

    let flush = coordinator.flush_segment(&id).unwrap();
    assert!(flush.tokens.starts_with(&report.appended));
    // Everything in the flushed segment lies after the reset point (frame 100)
    assert!(flush.tokens.iter().all(|t| t.frame_index >= 100));
    coordinator.close(&id).unwrap();
}

#[test]
fn feeding_from_the_capture_ring_buffer_matches_direct_calls() {
    let audio = sine(32000, 0, 440.0);

    // Capture side accumulates into the ring buffer; the engine is fed by
    // absolute-offset range queries against it.
    let mut ring = RingAudioBuffer::from_config(&Config::default().audio);
    for chunk in audio.chunks(1000) {
        ring.push_chunk(ring.next_offset(), chunk).unwrap();
    }

    let via_ring = {
        let coordinator = coordinator();
        let id = SessionId::from("ring");
        coordinator.open(id.clone()).unwrap();
        let mut start = 0u64;
        while start < ring.next_offset() {
            let end = (start + 8000).min(ring.next_offset());
            let samples = ring.range(start, end).unwrap();
            coordinator.process(&id, start, &samples).unwrap();
            start = end;
        }
        let flush = coordinator.flush_segment(&id).unwrap();
        coordinator.close(&id).unwrap();
        flush.tokens
    };

    let (_, direct) = run_split(&coordinator(), "direct", &audio, &[8000; 4]);
    assert_eq!(via_ring, direct);
}

#[test]
fn silence_emits_no_tokens_with_default_joint() {
    let coordinator = coordinator();
    let id = SessionId::from("silence");
    coordinator.open(id.clone()).unwrap();

    let report = coordinator.process(&id, 0, &vec![0.0f32; 32000]).unwrap();
    assert!(report.appended.is_empty());
    coordinator.close(&id).unwrap();
}
