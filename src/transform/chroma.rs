use ndarray::Array2;

/// Convert frequencies (Hz) to fractional octave numbers relative to A0
/// (27.5 Hz), so A440 sits at octave 4.0.
pub fn hz_to_octs(frequencies: &[f32]) -> Vec<f32> {
    let a0 = 440.0 / 16.0;
    frequencies
        .iter()
        .map(|&f| if f > 0.0 { (f / a0).log2() } else { f32::NEG_INFINITY })
        .collect()
}

/// Projection from FFT bins onto `n_chroma` pitch classes, shape
/// (n_chroma, n_fft / 2 + 1).
///
/// Gaussian bumps around each pitch class, columns L2-normalized, weighted by
/// a Gaussian over octaves centred on octave 5 (two octaves wide), rolled so
/// the first row is C. Tuning is fixed at A440.
pub fn chroma_filterbank(sr: u32, n_fft: usize, n_chroma: usize) -> Array2<f32> {
    const CENTER_OCTAVE: f32 = 5.0;
    const OCTAVE_WIDTH: f32 = 2.0;

    let n_freq = n_fft / 2 + 1;
    let mut wts = Array2::<f32>::zeros((n_chroma, n_freq));
    if n_fft == 0 || n_chroma == 0 {
        return wts;
    }

    let n_chroma_f = n_chroma as f32;
    let frequencies: Vec<f32> = (1..n_fft)
        .map(|i| i as f32 * sr as f32 / n_fft as f32)
        .collect();

    let mut frqbins: Vec<f32> = hz_to_octs(&frequencies)
        .into_iter()
        .map(|o| o * n_chroma_f)
        .collect();
    // DC gets a made-up position 1.5 octaves below the first bin
    let dc = frqbins.first().copied().unwrap_or(0.0) - 1.5 * n_chroma_f;
    frqbins.insert(0, dc);

    let binwidths: Vec<f32> = (0..frqbins.len())
        .map(|i| match frqbins.get(i + 1) {
            Some(next) => (next - frqbins[i]).max(1.0),
            None => 1.0,
        })
        .collect();

    let half = (n_chroma_f / 2.0).round();
    for fbin in 0..n_freq {
        let mut column = vec![0.0f32; n_chroma];
        for (chroma, w) in column.iter_mut().enumerate() {
            // Distance to this pitch class, wrapped into [-n/2, n/2)
            let d = (frqbins[fbin] - chroma as f32 + half + 10.0 * n_chroma_f).rem_euclid(n_chroma_f)
                - half;
            *w = (-0.5 * (2.0 * d / binwidths[fbin]).powi(2)).exp();
        }

        let norm = column.iter().map(|w| (*w as f64).powi(2)).sum::<f64>().sqrt().max(1e-10);
        let octave = frqbins[fbin] / n_chroma_f;
        let weight = (-0.5 * ((octave - CENTER_OCTAVE) / OCTAVE_WIDTH).powi(2)).exp();

        for (chroma, w) in column.into_iter().enumerate() {
            wts[(chroma, fbin)] = (w as f64 / norm) as f32 * weight;
        }
    }

    // Roll so that row 0 is C rather than A
    let shift = (3.0 * n_chroma_f / 12.0) as usize % n_chroma;
    if shift > 0 {
        let rolled = Array2::from_shape_fn((n_chroma, n_freq), |(c, f)| {
            wts[((c + shift) % n_chroma, f)]
        });
        wts = rolled;
    }

    wts
}

/// Chromagram from a power spectrogram (frames, n_freq) -> (frames, n_chroma),
/// each frame scaled so its largest pitch class is 1.
pub fn chromagram(power: &Array2<f32>, filterbank: &Array2<f32>) -> Array2<f32> {
    let mut chroma = power.dot(&filterbank.t());
    for mut frame in chroma.outer_iter_mut() {
        let max = frame.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        if max > f32::MIN_POSITIVE {
            frame.mapv_inplace(|v| v / max);
        }
    }
    chroma
}
