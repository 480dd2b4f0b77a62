use super::spectrum::power_to_db;
use ndarray::Array2;

/// Magnitude-weighted mean frequency of every frame, shape (frames, 1).
/// Silent frames get 0.
pub fn centroid(magnitude: &Array2<f32>, freqs: &[f32]) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros((magnitude.nrows(), 1));
    for (t, frame) in magnitude.outer_iter().enumerate() {
        let (weighted, total) = frame
            .iter()
            .zip(freqs)
            .fold((0.0f64, 0.0f64), |(w, s), (&mag, &f)| {
                (w + f as f64 * mag as f64, s + mag as f64)
            });
        out[(t, 0)] = if total > 1e-10 { (weighted / total) as f32 } else { 0.0 };
    }
    out
}

/// FFT bins belonging to one octave band of the contrast transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ContrastBand {
    /// Bins whose magnitudes are sorted to find peak and valley.
    pub bins: Vec<usize>,
    /// How many of the lowest/highest magnitudes are averaged.
    pub quantile_count: usize,
}

/// Octave bands `[0, fmin]`, `[fmin, 2 fmin]`, ... with the last band open up
/// to Nyquist. Each band after the first also takes the bin just below its
/// lower edge; every band but the last drops its top bin.
pub fn contrast_bands(sr: u32, n_fft: usize, n_bands: usize, fmin: f32) -> Vec<ContrastBand> {
    const QUANTILE: f32 = 0.02;

    let n_freq = n_fft / 2 + 1;
    let freqs: Vec<f32> = (0..n_freq)
        .map(|k| k as f32 * sr as f32 / n_fft as f32)
        .collect();

    let mut edges = vec![0.0f32; n_bands + 2];
    for (i, edge) in edges.iter_mut().skip(1).enumerate() {
        *edge = fmin * 2f32.powi(i as i32);
    }

    (0..=n_bands)
        .map(|k| {
            let (low, high) = (edges[k], edges[k + 1]);
            let mut bins: Vec<usize> = freqs
                .iter()
                .enumerate()
                .filter(|(_, f)| **f >= low && **f <= high)
                .map(|(i, _)| i)
                .collect();

            if let Some(&first) = bins.first() {
                if k > 0 && first > 0 {
                    bins.insert(0, first - 1);
                }
            }
            if k == n_bands {
                if let Some(&last) = bins.last() {
                    bins.extend(last + 1..n_freq);
                }
            }

            let selected = bins.len();
            if k < n_bands {
                bins.pop();
            }
            let quantile_count = ((QUANTILE * selected as f32).round_ties_even() as usize).max(1);

            ContrastBand {
                bins,
                quantile_count,
            }
        })
        .collect()
}

/// Spectral contrast (peak dB minus valley dB per band, in amplitude dB),
/// shape (frames, bands.len()).
pub fn contrast(magnitude: &Array2<f32>, bands: &[ContrastBand]) -> Array2<f32> {
    let n_frames = magnitude.nrows();
    let mut peak = Array2::<f32>::zeros((n_frames, bands.len()));
    let mut valley = Array2::<f32>::zeros((n_frames, bands.len()));
    let mut mags: Vec<f32> = Vec::new();

    for (t, frame) in magnitude.outer_iter().enumerate() {
        for (k, band) in bands.iter().enumerate() {
            mags.clear();
            mags.extend(band.bins.iter().map(|&b| frame[b]));
            if mags.is_empty() {
                continue;
            }
            mags.sort_by(|a, b| a.total_cmp(b));
            let q = band.quantile_count.min(mags.len());
            valley[(t, k)] = mags[..q].iter().sum::<f32>() / q as f32;
            peak[(t, k)] = mags[mags.len() - q..].iter().sum::<f32>() / q as f32;
        }
    }

    // Amplitude dB (20 log10): square before the power conversion
    let peak_db = power_to_db(&peak.mapv(|v| v * v), Some(80.0));
    let valley_db = power_to_db(&valley.mapv(|v| v * v), Some(80.0));
    peak_db - valley_db
}
