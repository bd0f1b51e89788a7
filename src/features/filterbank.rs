//! Slaney-style mel filterbank.
//!
//! Triangular filters on the Slaney mel scale (linear below 1kHz,
//! logarithmic above) with area normalization, matching the torchaudio
//! `norm="slaney", mel_scale="slaney"` filterbank the reference frontend
//! was trained with.

fn hertz_to_mel(freq: f32) -> f32 {
    let min_log_hertz = 1000.0f32;
    let min_log_mel = 15.0f32;
    let logstep = 27.0 / (6.4f32).ln();
    if freq >= min_log_hertz {
        min_log_mel + (freq / min_log_hertz).ln() * logstep
    } else {
        3.0 * freq / 200.0
    }
}

fn mel_to_hertz(mels: f32) -> f32 {
    let min_log_hertz = 1000.0f32;
    let min_log_mel = 15.0f32;
    let logstep = (6.4f32).ln() / 27.0;
    if mels >= min_log_mel {
        min_log_hertz * (logstep * (mels - min_log_mel)).exp()
    } else {
        200.0 * mels / 3.0
    }
}

/// Builds the filterbank as a flat `[mel_bins * n_freqs]` matrix, one row of
/// frequency-bin weights per mel bin.
///
/// `n_freqs` is `fft_size / 2 + 1`; `freq_min`/`freq_max` bound the covered
/// band. Weights are non-negative and each triangle is scaled by
/// `2 / bandwidth` (Slaney area normalization).
pub fn build(
    mel_bins: usize,
    n_freqs: usize,
    sample_rate: u32,
    freq_min: f32,
    freq_max: f32,
) -> Vec<f32> {
    let mut filters = vec![0.0f32; mel_bins * n_freqs];

    let nyquist = sample_rate as f32 / 2.0;
    let mut fft_freqs = vec![0.0f32; n_freqs];
    for (k, freq) in fft_freqs.iter_mut().enumerate() {
        *freq = k as f32 * nyquist / (n_freqs - 1) as f32;
    }

    let mel_min = hertz_to_mel(freq_min);
    let mel_max = hertz_to_mel(freq_max);

    let mut edge_freqs = vec![0.0f32; mel_bins + 2];
    for (i, edge) in edge_freqs.iter_mut().enumerate() {
        let mel = mel_min + (mel_max - mel_min) * i as f32 / (mel_bins + 1) as f32;
        *edge = mel_to_hertz(mel);
    }

    let mut edge_diff = vec![0.0f32; mel_bins + 1];
    for i in 0..mel_bins + 1 {
        edge_diff[i] = (edge_freqs[i + 1] - edge_freqs[i]).max(1e-6);
    }

    for m in 0..mel_bins {
        let enorm = 2.0 / (edge_freqs[m + 2] - edge_freqs[m]);
        for k in 0..n_freqs {
            let up = (fft_freqs[k] - edge_freqs[m]) / edge_diff[m];
            let down = (edge_freqs[m + 2] - fft_freqs[k]) / edge_diff[m + 1];
            filters[m * n_freqs + k] = up.min(down).max(0.0) * enorm;
        }
    }

    filters
}
