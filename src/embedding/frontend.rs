//! Log-mel example framing for the VGGish network.
//!
//! Mono 16 kHz audio, 25 ms periodic Hann windows every 10 ms, 512-point FFT
//! magnitudes, 64 HTK mel bands over 125..7500 Hz, `ln(mel + 0.01)`, then
//! non-overlapping 96-frame (0.96 s) examples.

use ndarray::{s, Array2, Array3, Axis};
use realfft::RealFftPlanner;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use super::Waveform;
use crate::{Result, TagError};

pub const SAMPLE_RATE: u32 = 16_000;
pub const STFT_WINDOW_SAMPLES: usize = 400;
pub const STFT_HOP_SAMPLES: usize = 160;
pub const FFT_LENGTH: usize = 512;
pub const NUM_MEL_BINS: usize = 64;
pub const MEL_MIN_HZ: f32 = 125.0;
pub const MEL_MAX_HZ: f32 = 7500.0;
pub const LOG_OFFSET: f32 = 0.01;
pub const EXAMPLE_FRAMES: usize = 96;
pub const EXAMPLE_HOP_FRAMES: usize = 96;

const MEL_BREAK_FREQUENCY_HERTZ: f32 = 700.0;
const MEL_HIGH_FREQUENCY_Q: f32 = 1127.0;

/// `[num_examples, EXAMPLE_FRAMES, NUM_MEL_BINS]` log-mel patches for `waveform`.
pub fn waveform_to_examples(waveform: &Waveform) -> Result<Array3<f32>> {
    let mono = waveform.to_mono();
    let samples = resample(mono, waveform.sample_rate)?;
    let log_mel = log_mel_spectrogram(&samples)?;

    let examples = frame_count(log_mel.nrows(), EXAMPLE_FRAMES, EXAMPLE_HOP_FRAMES);
    let mut out = Array3::<f32>::zeros((examples, EXAMPLE_FRAMES, NUM_MEL_BINS));
    for (i, mut example) in out.axis_iter_mut(Axis(0)).enumerate() {
        let start = i * EXAMPLE_HOP_FRAMES;
        example.assign(&log_mel.slice(s![start..start + EXAMPLE_FRAMES, ..]));
    }

    tracing::debug!(
        "{:.2}s of audio -> {} log-mel frames -> {} examples",
        waveform.duration_seconds(),
        log_mel.nrows(),
        examples
    );
    Ok(out)
}

/// Number of full windows of `window` items taken every `hop` items.
fn frame_count(len: usize, window: usize, hop: usize) -> usize {
    if len < window {
        0
    } else {
        1 + (len - window) / hop
    }
}

fn resample(samples: Vec<f32>, sample_rate: u32) -> Result<Vec<f32>> {
    if sample_rate == SAMPLE_RATE || samples.is_empty() {
        return Ok(samples);
    }
    if sample_rate == 0 {
        return Err(TagError::Embedding("sample rate is zero".into()));
    }

    tracing::debug!("resampling {} Hz -> {} Hz", sample_rate, SAMPLE_RATE);
    let mut resampler = FastFixedIn::<f32>::new(
        SAMPLE_RATE as f64 / sample_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        samples.len(),
        1,
    )
    .map_err(|e| TagError::Embedding(format!("failed to create resampler: {e}")))?;

    let input = vec![samples];
    let mut output = resampler
        .process(&input, None)
        .map_err(|e| TagError::Embedding(format!("resampling failed: {e}")))?;
    Ok(output.pop().unwrap_or_default())
}

/// Periodic Hann window, as used for spectral analysis.
fn periodic_hann(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| 0.5 - 0.5 * (std::f32::consts::TAU * n as f32 / len as f32).cos())
        .collect()
}

fn hertz_to_mel(hz: f32) -> f32 {
    MEL_HIGH_FREQUENCY_Q * (1.0 + hz / MEL_BREAK_FREQUENCY_HERTZ).ln()
}

/// `[num_spectrogram_bins, NUM_MEL_BINS]` triangular filterbank; the DC bin
/// carries no weight.
pub fn mel_matrix(num_spectrogram_bins: usize, sample_rate: u32) -> Array2<f32> {
    let nyquist = sample_rate as f32 / 2.0;
    let bins_mel: Vec<f32> = (0..num_spectrogram_bins)
        .map(|k| hertz_to_mel(nyquist * k as f32 / (num_spectrogram_bins - 1) as f32))
        .collect();

    let lower = hertz_to_mel(MEL_MIN_HZ);
    let upper = hertz_to_mel(MEL_MAX_HZ);
    let edges: Vec<f32> = (0..NUM_MEL_BINS + 2)
        .map(|i| lower + (upper - lower) * i as f32 / (NUM_MEL_BINS + 1) as f32)
        .collect();

    let mut weights = Array2::<f32>::zeros((num_spectrogram_bins, NUM_MEL_BINS));
    for band in 0..NUM_MEL_BINS {
        let (lo, center, hi) = (edges[band], edges[band + 1], edges[band + 2]);
        for (k, &mel) in bins_mel.iter().enumerate().skip(1) {
            let lower_slope = (mel - lo) / (center - lo);
            let upper_slope = (hi - mel) / (hi - center);
            weights[[k, band]] = lower_slope.min(upper_slope).max(0.0);
        }
    }
    weights
}

/// `[frames, NUM_MEL_BINS]` log mel spectrogram of 16 kHz mono samples.
pub fn log_mel_spectrogram(samples: &[f32]) -> Result<Array2<f32>> {
    let frames = frame_count(samples.len(), STFT_WINDOW_SAMPLES, STFT_HOP_SAMPLES);
    let bins = FFT_LENGTH / 2 + 1;

    let window = periodic_hann(STFT_WINDOW_SAMPLES);
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FFT_LENGTH);
    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();

    let mut magnitudes = Array2::<f32>::zeros((frames, bins));
    for (f, mut row) in magnitudes.axis_iter_mut(Axis(0)).enumerate() {
        let frame = &samples[f * STFT_HOP_SAMPLES..f * STFT_HOP_SAMPLES + STFT_WINDOW_SAMPLES];
        input.fill(0.0);
        for ((dst, &x), &w) in input.iter_mut().zip(frame).zip(&window) {
            *dst = x * w;
        }
        fft.process(&mut input, &mut spectrum)
            .map_err(|e| TagError::Embedding(format!("fft failed: {e}")))?;
        for (dst, c) in row.iter_mut().zip(&spectrum) {
            *dst = c.norm();
        }
    }

    let mel = magnitudes.dot(&mel_matrix(bins, SAMPLE_RATE));
    Ok(mel.mapv(|v| (v + LOG_OFFSET).ln()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, seconds: f32, sample_rate: u32) -> Vec<f32> {
        let n = (seconds * sample_rate as f32) as usize;
        (0..n)
            .map(|i| 0.5 * (std::f32::consts::TAU * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn thirty_seconds_give_thirty_one_examples() {
        let w = Waveform::mono(sine(440.0, 30.0, SAMPLE_RATE), SAMPLE_RATE);
        let examples = waveform_to_examples(&w).unwrap();
        assert_eq!(examples.dim(), (31, EXAMPLE_FRAMES, NUM_MEL_BINS));
    }

    #[test]
    fn short_audio_gives_no_examples() {
        let w = Waveform::mono(sine(440.0, 0.5, SAMPLE_RATE), SAMPLE_RATE);
        assert_eq!(waveform_to_examples(&w).unwrap().dim().0, 0);
        let empty = Waveform::mono(Vec::new(), 44_100);
        assert_eq!(waveform_to_examples(&empty).unwrap().dim().0, 0);
    }

    #[test]
    fn stereo_44k_is_mixed_and_resampled() {
        let mono = sine(440.0, 2.0, 44_100);
        let stereo: Vec<f32> = mono.iter().flat_map(|&v| [v, v]).collect();
        let w = Waveform::new(stereo, 2, 44_100);
        let examples = waveform_to_examples(&w).unwrap();
        assert_eq!(examples.dim(), (2, EXAMPLE_FRAMES, NUM_MEL_BINS));
    }

    #[test]
    fn filterbank_shape() {
        let m = mel_matrix(FFT_LENGTH / 2 + 1, SAMPLE_RATE);
        assert_eq!(m.dim(), (257, NUM_MEL_BINS));
        assert!(m.row(0).iter().all(|&v| v == 0.0));
        assert!(m.iter().all(|&v| (0.0..=1.0).contains(&v)));
        for band in m.columns() {
            assert!(band.sum() > 0.0);
        }
    }

    #[test]
    fn tone_energy_lands_in_matching_band() {
        let log_mel = log_mel_spectrogram(&sine(1000.0, 1.0, SAMPLE_RATE)).unwrap();
        assert_eq!(log_mel.nrows(), 1 + (16_000 - 400) / 160);

        let row = log_mel.row(10);
        let peak = row
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0;
        // 1 kHz sits near mel 1000, between bands 19 and 20.
        assert!((18..=21).contains(&peak), "peak band {peak}");
    }

    #[test]
    fn silence_is_log_offset() {
        let log_mel = log_mel_spectrogram(&vec![0.0; 16_000]).unwrap();
        let floor = LOG_OFFSET.ln();
        assert!(log_mel.iter().all(|&v| (v - floor).abs() < 1e-6));
    }
}
