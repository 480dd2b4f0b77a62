pub mod chroma;
pub mod mel;
pub mod spectral;
pub mod spectrum;

use crate::config::ExtractConfig;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use spectral::ContrastBand;
use spectrum::Stft;
use std::fmt;
use thiserror::Error;

/// Chroma bins inside the combined layout, independent of `num_coefficients`.
const COMBINED_CHROMA_BINS: usize = 12;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("FFT error: {0}")]
    Fft(String),
    #[error("invalid transform parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("feature shape error: {0}")]
    Shape(String),
    #[error("{0} basis was not built for this extractor")]
    MissingBasis(&'static str),
}

/// The per-segment representation that is validated and stored.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureKind {
    #[default]
    Mfcc,
    Chroma,
    SpectralCentroid,
    SpectralContrast,
    /// MFCC | centroid | 12-bin chroma | contrast, side by side.
    Combined,
}

impl FeatureKind {
    pub fn uses_mel(self) -> bool {
        matches!(self, FeatureKind::Mfcc | FeatureKind::Combined)
    }

    pub fn uses_chroma(self) -> bool {
        matches!(self, FeatureKind::Chroma | FeatureKind::Combined)
    }

    pub fn uses_contrast(self) -> bool {
        matches!(self, FeatureKind::SpectralContrast | FeatureKind::Combined)
    }

    pub fn uses_centroid(self) -> bool {
        matches!(self, FeatureKind::SpectralCentroid | FeatureKind::Combined)
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureKind::Mfcc => "mfcc",
            FeatureKind::Chroma => "chroma",
            FeatureKind::SpectralCentroid => "spectral-centroid",
            FeatureKind::SpectralContrast => "spectral-contrast",
            FeatureKind::Combined => "combined",
        };
        f.write_str(name)
    }
}

/// The subset of [`ExtractConfig`] that shapes the transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    pub kind: FeatureKind,
    pub n_fft: usize,
    pub hop_length: usize,
    pub num_coefficients: usize,
    pub n_mels: usize,
    pub contrast_bands: usize,
    pub contrast_fmin: f32,
}

impl From<&ExtractConfig> for TransformParams {
    fn from(config: &ExtractConfig) -> Self {
        Self {
            kind: config.feature,
            n_fft: config.n_fft,
            hop_length: config.hop_length,
            num_coefficients: config.num_coefficients,
            n_mels: config.n_mels,
            contrast_bands: config.contrast_bands,
            contrast_fmin: config.contrast_fmin,
        }
    }
}

/// Turns a mono segment into a time-major feature matrix
/// (frames x [`width`](Self::width)).
///
/// Filterbanks for the configured kind are built once here; `extract` only
/// reads them, so one extractor is shared by every worker.
pub struct FeatureExtractor {
    params: TransformParams,
    sample_rate: u32,
    stft: Stft,
    bin_freqs: Vec<f32>,
    mel: Option<mel::MelBasis>,
    chroma: Option<Array2<f32>>,
    contrast: Option<Vec<ContrastBand>>,
}

impl FeatureExtractor {
    pub fn new(params: TransformParams, sample_rate: u32) -> Result<Self, TransformError> {
        if sample_rate == 0 {
            return Err(TransformError::InvalidParameter {
                name: "sample_rate",
                reason: "must be > 0".into(),
            });
        }
        let stft = Stft::new(params.n_fft, params.hop_length)?;
        let kind = params.kind;

        let mel = kind.uses_mel().then(|| {
            mel::MelBasis::new(sample_rate, params.n_fft, params.n_mels, params.num_coefficients)
        });
        let chroma = kind.uses_chroma().then(|| {
            chroma::chroma_filterbank(sample_rate, params.n_fft, Self::chroma_bins(&params))
        });
        let contrast = kind.uses_contrast().then(|| {
            spectral::contrast_bands(
                sample_rate,
                params.n_fft,
                params.contrast_bands,
                params.contrast_fmin,
            )
        });

        log::debug!(
            "Feature extractor: {} at {} Hz, n_fft={}, hop={}, width={}",
            kind,
            sample_rate,
            params.n_fft,
            params.hop_length,
            Self::width_of(&params)
        );

        Ok(Self {
            bin_freqs: stft.bin_frequencies(sample_rate),
            params,
            sample_rate,
            stft,
            mel,
            chroma,
            contrast,
        })
    }

    pub fn from_config(config: &ExtractConfig) -> Result<Self, TransformError> {
        Self::new(TransformParams::from(config), config.sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn params(&self) -> &TransformParams {
        &self.params
    }

    /// Columns of every produced matrix.
    pub fn width(&self) -> usize {
        Self::width_of(&self.params)
    }

    /// Rows produced for a segment of `len` samples.
    pub fn frame_count(&self, len: usize) -> usize {
        self.stft.frame_count(len)
    }

    fn chroma_bins(params: &TransformParams) -> usize {
        match params.kind {
            FeatureKind::Combined => COMBINED_CHROMA_BINS,
            _ => params.num_coefficients,
        }
    }

    fn width_of(params: &TransformParams) -> usize {
        let mut width = 0;
        if params.kind.uses_mel() {
            width += params.num_coefficients;
        }
        if params.kind.uses_centroid() {
            width += 1;
        }
        if params.kind.uses_chroma() {
            width += Self::chroma_bins(params);
        }
        if params.kind.uses_contrast() {
            width += params.contrast_bands + 1;
        }
        width
    }

    pub fn extract(&self, samples: &[f32]) -> Result<Array2<f32>, TransformError> {
        let power = self.stft.power(samples)?;

        match self.params.kind {
            FeatureKind::Mfcc => self.mfcc(&power),
            FeatureKind::Chroma => self.chroma(&power),
            FeatureKind::SpectralCentroid => Ok(self.centroid(&magnitude(&power))),
            FeatureKind::SpectralContrast => self.contrast(&magnitude(&power)),
            FeatureKind::Combined => {
                let mag = magnitude(&power);
                let mfcc = self.mfcc(&power)?;
                let centroid = self.centroid(&mag);
                let chroma = self.chroma(&power)?;
                let contrast = self.contrast(&mag)?;
                ndarray::concatenate(
                    Axis(1),
                    &[mfcc.view(), centroid.view(), chroma.view(), contrast.view()],
                )
                .map_err(|e| TransformError::Shape(e.to_string()))
            }
        }
    }

    fn mfcc(&self, power: &Array2<f32>) -> Result<Array2<f32>, TransformError> {
        let basis = self.mel.as_ref().ok_or(TransformError::MissingBasis("mel"))?;
        Ok(basis.mfcc(power))
    }

    fn chroma(&self, power: &Array2<f32>) -> Result<Array2<f32>, TransformError> {
        let fb = self
            .chroma
            .as_ref()
            .ok_or(TransformError::MissingBasis("chroma"))?;
        Ok(chroma::chromagram(power, fb))
    }

    fn centroid(&self, magnitude: &Array2<f32>) -> Array2<f32> {
        spectral::centroid(magnitude, &self.bin_freqs)
    }

    fn contrast(&self, magnitude: &Array2<f32>) -> Result<Array2<f32>, TransformError> {
        let bands = self
            .contrast
            .as_ref()
            .ok_or(TransformError::MissingBasis("contrast"))?;
        Ok(spectral::contrast(magnitude, bands))
    }
}

fn magnitude(power: &Array2<f32>) -> Array2<f32> {
    power.mapv(f32::sqrt)
}

/// Row-major copy of a feature matrix, the layout stored in datasets.
pub fn to_rows(matrix: &Array2<f32>) -> Vec<Vec<f32>> {
    matrix.outer_iter().map(|row| row.to_vec()).collect()
}
