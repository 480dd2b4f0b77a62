use super::TransformError;
use ndarray::Array2;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Periodic Hann window of length `n`.
pub fn hann(n: usize) -> Vec<f32> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![1.0];
    }
    let m = n as f32;
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / m).cos())
        .collect()
}

/// Centered short-time Fourier transform with a Hann window.
///
/// The signal is zero-padded by `n_fft / 2` on both sides, so `n` samples
/// give `1 + n / hop` frames (for even `n_fft`). An empty signal gives no
/// frames at all.
pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
    fft: Arc<dyn RealToComplex<f32>>,
}

impl Stft {
    pub fn new(n_fft: usize, hop_length: usize) -> Result<Self, TransformError> {
        if n_fft == 0 {
            return Err(TransformError::InvalidParameter {
                name: "n_fft",
                reason: "must be > 0".into(),
            });
        }
        if hop_length == 0 {
            return Err(TransformError::InvalidParameter {
                name: "hop_length",
                reason: "must be > 0".into(),
            });
        }
        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(n_fft);
        Ok(Self {
            n_fft,
            hop_length,
            window: hann(n_fft),
            fft,
        })
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn n_freq(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of frames produced for a signal of `len` samples.
    pub fn frame_count(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let padded = len + 2 * (self.n_fft / 2);
        if padded < self.n_fft {
            0
        } else {
            (padded - self.n_fft) / self.hop_length + 1
        }
    }

    /// Center frequency of every FFT bin.
    pub fn bin_frequencies(&self, sample_rate: u32) -> Vec<f32> {
        (0..self.n_freq())
            .map(|k| k as f32 * sample_rate as f32 / self.n_fft as f32)
            .collect()
    }

    /// Power spectrogram `|X|^2`, shape (frames, n_fft / 2 + 1).
    pub fn power(&self, y: &[f32]) -> Result<Array2<f32>, TransformError> {
        let n_frames = self.frame_count(y.len());
        let mut out = Array2::<f32>::zeros((n_frames, self.n_freq()));
        if n_frames == 0 {
            return Ok(out);
        }

        let pad = self.n_fft / 2;
        let mut input = self.fft.make_input_vec();
        let mut spectrum = self.fft.make_output_vec();
        let mut scratch = self.fft.make_scratch_vec();

        for (t, mut row) in out.outer_iter_mut().enumerate() {
            let start = t * self.hop_length;
            for (i, slot) in input.iter_mut().enumerate() {
                let sample = (start + i)
                    .checked_sub(pad)
                    .and_then(|j| y.get(j))
                    .copied()
                    .unwrap_or(0.0);
                *slot = sample * self.window[i];
            }
            self.fft
                .process_with_scratch(&mut input, &mut spectrum, &mut scratch)
                .map_err(|e| TransformError::Fft(e.to_string()))?;
            for (dst, c) in row.iter_mut().zip(&spectrum) {
                *dst = c.norm_sqr();
            }
        }

        Ok(out)
    }
}

/// Convert a power matrix to dB relative to 1.0, flooring at `amin` and
/// clipping everything more than `top_db` below the matrix maximum.
pub fn power_to_db(power: &Array2<f32>, top_db: Option<f32>) -> Array2<f32> {
    const AMIN: f32 = 1e-10;
    let mut db = power.mapv(|p| 10.0 * p.max(AMIN).log10());
    if let Some(top) = top_db {
        let max_db = db.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let threshold = max_db - top;
        db.mapv_inplace(|v| v.max(threshold));
    }
    db
}
