//! Mel filterbank and mel-frequency cepstral coefficients.

use super::spectrum::power_to_db;
use ndarray::Array2;

/// Convert frequency in Hz to the (Slaney) mel scale: linear below 1 kHz,
/// logarithmic above.
pub fn hz_to_mel(hz: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = (6.4f32).ln() / 27.0;
    if hz < min_log_hz {
        hz / f_sp
    } else {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    }
}

/// Inverse of [`hz_to_mel`].
pub fn mel_to_hz(mel: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = (6.4f32).ln() / 27.0;
    if mel < min_log_mel {
        mel * f_sp
    } else {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    }
}

/// `n` frequencies evenly spaced on the mel scale between `fmin` and `fmax`.
pub fn mel_frequencies(n: usize, fmin: f32, fmax: f32) -> Vec<f32> {
    if n == 0 {
        return Vec::new();
    }
    let mel_min = hz_to_mel(fmin.max(0.0));
    let mel_max = hz_to_mel(fmax.max(fmin));
    let step = (mel_max - mel_min) / (n as f32 - 1.0).max(1.0);
    (0..n).map(|i| mel_to_hz(mel_min + step * i as f32)).collect()
}

/// Triangular, area-normalized mel filterbank of shape (n_mels, n_fft / 2 + 1).
pub fn mel_filterbank(sr: u32, n_fft: usize, n_mels: usize, fmin: f32, fmax: f32) -> Array2<f32> {
    let n_freq = n_fft / 2 + 1;
    let mut fb = Array2::<f32>::zeros((n_mels, n_freq));
    if n_mels == 0 || n_fft == 0 {
        return fb;
    }

    let fmax = fmax.min(sr as f32 / 2.0).max(fmin);
    let mel_points = mel_frequencies(n_mels + 2, fmin, fmax);
    let fft_freqs: Vec<f32> = (0..n_freq)
        .map(|k| k as f32 * sr as f32 / n_fft as f32)
        .collect();

    for (m, mut row) in fb.outer_iter_mut().enumerate() {
        let (lo, center, hi) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
        let left = (center - lo).max(1e-8) as f64;
        let right = (hi - center).max(1e-8) as f64;
        let enorm = 2.0 / (hi - lo).max(1e-8) as f64;

        for (w, &freq) in row.iter_mut().zip(&fft_freqs) {
            let lower = (freq - lo) as f64 / left;
            let upper = (hi - freq) as f64 / right;
            *w = (lower.min(upper).max(0.0) * enorm) as f32;
        }
    }

    fb
}

/// Orthonormal DCT-II basis of shape (n_out, n_in).
pub fn dct_basis(n_out: usize, n_in: usize) -> Array2<f32> {
    let n = n_in as f32;
    Array2::from_shape_fn((n_out, n_in), |(k, i)| {
        let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
        scale * (std::f32::consts::PI / n * (i as f32 + 0.5) * k as f32).cos()
    })
}

/// Precomputed mel filterbank + DCT for one (sample rate, n_fft) pair.
#[derive(Debug, Clone)]
pub struct MelBasis {
    pub filterbank: Array2<f32>,
    pub dct: Array2<f32>,
}

impl MelBasis {
    pub fn new(sr: u32, n_fft: usize, n_mels: usize, n_mfcc: usize) -> Self {
        Self {
            filterbank: mel_filterbank(sr, n_fft, n_mels, 0.0, sr as f32 / 2.0),
            dct: dct_basis(n_mfcc, n_mels),
        }
    }

    pub fn n_mfcc(&self) -> usize {
        self.dct.nrows()
    }

    /// MFCCs from a power spectrogram (frames, n_freq) -> (frames, n_mfcc).
    ///
    /// The log-mel spectrogram is floored 80 dB below its maximum over the
    /// whole input before the DCT.
    pub fn mfcc(&self, power: &Array2<f32>) -> Array2<f32> {
        let mel = power.dot(&self.filterbank.t());
        let log_mel = power_to_db(&mel, Some(80.0));
        log_mel.dot(&self.dct.t())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mel_scale_round_trips() {
        for hz in [0.0f32, 200.0, 999.0, 1000.0, 4000.0, 11025.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((back - hz).abs() < 0.05, "{} -> {}", hz, back);
        }
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-4);
    }

    #[test]
    fn filterbank_shape_and_coverage() {
        let fb = mel_filterbank(22050, 2048, 128, 0.0, 11025.0);
        assert_eq!(fb.shape(), &[128, 1025]);
        assert!(fb.iter().all(|w| *w >= 0.0));
        // Every filter has some support
        for row in fb.outer_iter() {
            assert!(row.iter().any(|w| *w > 0.0));
        }
    }

    #[test]
    fn dct_basis_is_orthonormal() {
        let d = dct_basis(8, 8);
        let gram = d.dot(&d.t());
        for i in 0..8 {
            for j in 0..8 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((gram[(i, j)] - expected).abs() < 1e-4, "({}, {})", i, j);
            }
        }
    }

    #[test]
    fn mfcc_shape_is_time_major() {
        let basis = MelBasis::new(22050, 512, 40, 13);
        let power = Array2::from_elem((7, 257), 1e-3f32);
        let m = basis.mfcc(&power);
        assert_eq!(m.shape(), &[7, 13]);
        assert_eq!(basis.n_mfcc(), 13);
        assert!(m.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn silent_frames_have_flat_cepstrum() {
        let basis = MelBasis::new(22050, 512, 40, 13);
        let power = Array2::<f32>::zeros((3, 257));
        let m = basis.mfcc(&power);
        // Constant log-mel -> all energy in c0
        for row in m.outer_iter() {
            assert!(row[0] < 0.0);
            for c in row.iter().skip(1) {
                assert!(c.abs() < 1e-2);
            }
        }
    }
}
