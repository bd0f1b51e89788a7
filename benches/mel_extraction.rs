use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use streamscribe::MelExtractor;
use streamscribe::config::FeatureConfig;

/// Synthetic speech-band test signal.
fn tone_mix(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / 16000.0;
            0.4 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
                + 0.2 * (2.0 * std::f32::consts::PI * 880.0 * t).sin()
                + 0.1 * (2.0 * std::f32::consts::PI * 2000.0 * t).sin()
        })
        .collect()
}

/// One batch call over the whole signal.
fn bench_batch(c: &mut Criterion) {
    let audio = tone_mix(16000 * 10);

    c.bench_function("mel_batch_10s", |b| {
        b.iter(|| {
            let mut extractor = MelExtractor::new(FeatureConfig::default(), 16000);
            black_box(extractor.extend(0, black_box(&audio)).unwrap())
        })
    });
}

/// Streaming chunk sizes: the per-chunk cost is what bounds latency.
fn bench_streaming_chunks(c: &mut Criterion) {
    let audio = tone_mix(16000 * 10);
    let mut group = c.benchmark_group("mel_streaming");

    for chunk_ms in [10usize, 100, 500] {
        let chunk_len = 16 * chunk_ms;
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{chunk_ms}ms")),
            &chunk_len,
            |b, &chunk_len| {
                b.iter(|| {
                    let mut extractor = MelExtractor::new(FeatureConfig::default(), 16000);
                    let mut frames = 0usize;
                    let mut offset = 0usize;
                    while offset < audio.len() {
                        let end = (offset + chunk_len).min(audio.len());
                        frames += extractor
                            .extend(offset as u64, &audio[offset..end])
                            .unwrap()
                            .len();
                        offset = end;
                    }
                    black_box(frames)
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_batch, bench_streaming_chunks);
criterion_main!(benches);
