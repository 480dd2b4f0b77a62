use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scanner::LabelMode;
use crate::transform::FeatureKind;

/// Dataset root used when neither the CLI nor the config file names one.
pub const DEFAULT_DATASET_PATH: &str = "genres";
/// Output file used when neither the CLI nor the config file names one.
pub const DEFAULT_OUTPUT_PATH: &str = "data.json";

/// Largest `sample_rate * track_duration` a configuration may ask for.
const MAX_SAMPLES_PER_TRACK: f64 = u32::MAX as f64;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}

/// Parameters of one extraction run.
///
/// Every field has a default; the config file's `[extract]` table and the CLI
/// flags override individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Target sample rate every track is decoded to.
    pub sample_rate: u32,
    /// Assumed track length in seconds. Segment positions derive from this,
    /// not from the decoded length.
    pub track_duration: f64,
    /// Number of fixed windows each track is split into.
    pub num_segments: usize,
    /// FFT window size in samples.
    pub n_fft: usize,
    /// Hop between analysis frames in samples.
    pub hop_length: usize,
    /// MFCC coefficient count; also the chroma bin count for `chroma`.
    pub num_coefficients: usize,
    /// Mel bands feeding the MFCC transform.
    pub n_mels: usize,
    /// Octave bands for spectral contrast (the matrix has one more column).
    pub contrast_bands: usize,
    /// Lower edge of the first contrast band in Hz.
    pub contrast_fmin: f32,
    /// The feature representation that is validated and stored.
    pub feature: FeatureKind,
    /// Number of parallel decode workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            track_duration: 30.0,
            num_segments: 10,
            n_fft: 2048,
            hop_length: 512,
            num_coefficients: 13,
            n_mels: 128,
            contrast_bands: 6,
            contrast_fmin: 200.0,
            feature: FeatureKind::Mfcc,
            workers: 0,
        }
    }
}

impl ExtractConfig {
    /// Reject parameter combinations that cannot produce a dataset.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(name: &'static str, reason: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                name,
                reason: reason.into(),
            })
        }

        if self.sample_rate == 0 {
            return invalid("sample_rate", "must be > 0");
        }
        if !self.track_duration.is_finite() || self.track_duration <= 0.0 {
            return invalid(
                "track_duration",
                format!("must be a positive number of seconds, got {}", self.track_duration),
            );
        }
        if self.num_segments == 0 {
            return invalid("num_segments", "must be > 0");
        }
        if self.n_fft == 0 {
            return invalid("n_fft", "must be > 0");
        }
        if self.hop_length == 0 {
            return invalid("hop_length", "must be > 0");
        }
        if self.num_coefficients == 0 {
            return invalid("num_coefficients", "must be > 0");
        }
        if self.feature.uses_mel() {
            if self.n_mels == 0 {
                return invalid("n_mels", "must be > 0");
            }
            if self.num_coefficients > self.n_mels {
                return invalid(
                    "num_coefficients",
                    format!(
                        "{} coefficients need at least as many mel bands (n_mels = {})",
                        self.num_coefficients, self.n_mels
                    ),
                );
            }
        }
        if self.feature.uses_contrast() {
            if self.contrast_bands == 0 {
                return invalid("contrast_bands", "must be > 0");
            }
            if !(self.contrast_fmin > 0.0) {
                return invalid("contrast_fmin", "must be > 0 Hz");
            }
            // The last band is open-ended; every band below it must start under Nyquist.
            let top_edge = self.contrast_fmin * 2f32.powi(self.contrast_bands as i32 - 1);
            let nyquist = self.sample_rate as f32 / 2.0;
            if top_edge >= nyquist {
                return invalid(
                    "contrast_bands",
                    format!(
                        "band edge {:.0} Hz reaches Nyquist ({:.0} Hz); lower contrast_fmin or contrast_bands",
                        top_edge, nyquist
                    ),
                );
            }
        }

        let samples_per_track = self.sample_rate as f64 * self.track_duration;
        if samples_per_track > MAX_SAMPLES_PER_TRACK {
            return invalid(
                "track_duration",
                format!(
                    "{} s at {} Hz is {:.0} samples per track, more than {}",
                    self.track_duration, self.sample_rate, samples_per_track, MAX_SAMPLES_PER_TRACK
                ),
            );
        }
        if samples_per_track / (self.num_segments as f64) < 1.0 {
            return invalid(
                "num_segments",
                format!(
                    "{} segments of a {:.0}-sample track leaves segments shorter than one sample",
                    self.num_segments, samples_per_track
                ),
            );
        }

        Ok(())
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }
}

/// Extraction parameters given for a single run (command-line flags).
/// `None` keeps whatever the config file or the defaults say.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractOverrides {
    pub feature: Option<FeatureKind>,
    pub sample_rate: Option<u32>,
    pub track_duration: Option<f64>,
    pub num_segments: Option<usize>,
    pub n_fft: Option<usize>,
    pub hop_length: Option<usize>,
    pub num_coefficients: Option<usize>,
    pub workers: Option<usize>,
}

impl ExtractConfig {
    /// This configuration with every set override applied on top.
    pub fn with_overrides(&self, overrides: &ExtractOverrides) -> Self {
        Self {
            feature: overrides.feature.unwrap_or(self.feature),
            sample_rate: overrides.sample_rate.unwrap_or(self.sample_rate),
            track_duration: overrides.track_duration.unwrap_or(self.track_duration),
            num_segments: overrides.num_segments.unwrap_or(self.num_segments),
            n_fft: overrides.n_fft.unwrap_or(self.n_fft),
            hop_length: overrides.hop_length.unwrap_or(self.hop_length),
            num_coefficients: overrides.num_coefficients.unwrap_or(self.num_coefficients),
            workers: overrides.workers.unwrap_or(self.workers),
            ..self.clone()
        }
    }
}

/// Application configuration loaded from a TOML or YAML config file.
/// Every field has a default, so the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Dataset root (used when `extract`/`inventory` get no path argument).
    pub dataset_path: Option<PathBuf>,
    /// Where `extract` writes the dataset.
    pub output_path: Option<PathBuf>,
    /// Directory layout of the dataset root.
    pub mode: Option<LabelMode>,
    /// Extraction parameters.
    pub extract: ExtractConfig,
}

impl AppConfig {
    /// Load config from `~/.config/mirset/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match Self::load_from(&path) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("{}. Using defaults.", e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path. `.yaml`/`.yml` files are parsed as
    /// YAML, everything else as TOML.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        let parsed = if is_yaml {
            serde_yaml::from_str::<AppConfig>(&contents).map_err(|e| e.to_string())
        } else {
            toml::from_str::<AppConfig>(&contents).map_err(|e| e.to_string())
        };

        match parsed {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(message) => Err(ConfigError::Parse {
                path: path.display().to_string(),
                message,
            }),
        }
    }

    /// Dataset root: command line, then config file, then `genres`.
    pub fn dataset_root(&self, cli: Option<PathBuf>) -> PathBuf {
        cli.or_else(|| self.dataset_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATASET_PATH))
    }

    /// Output file: command line, then config file, then `data.json`.
    pub fn output(&self, cli: Option<PathBuf>) -> PathBuf {
        cli.or_else(|| self.output_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH))
    }

    /// Label mode: command line, then config file, then genre.
    pub fn label_mode(&self, cli: Option<LabelMode>) -> LabelMode {
        cli.or(self.mode).unwrap_or_default()
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ExtractConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_segments_rejected() {
        let cfg = ExtractConfig {
            num_segments: 0,
            ..Default::default()
        };
        match cfg.validate() {
            Err(ConfigError::Invalid { name, .. }) => assert_eq!(name, "num_segments"),
            other => panic!("expected invalid num_segments, got {:?}", other),
        }
    }

    #[test]
    fn zero_hop_rejected() {
        let cfg = ExtractConfig {
            hop_length: 0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { name: "hop_length", .. })
        ));
    }

    #[test]
    fn non_finite_duration_rejected() {
        for duration in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let cfg = ExtractConfig {
                track_duration: duration,
                ..Default::default()
            };
            assert!(cfg.validate().is_err(), "duration {} accepted", duration);
        }
    }

    #[test]
    fn more_segments_than_samples_rejected() {
        let cfg = ExtractConfig {
            sample_rate: 10,
            track_duration: 1.0,
            num_segments: 11,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn absurd_track_duration_rejected() {
        let cfg = ExtractConfig {
            track_duration: 1e300,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { name: "track_duration", .. })
        ));

        // Just over u32::MAX samples at 22050 Hz
        let cfg = ExtractConfig {
            track_duration: 200_000.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        // A long but sane track is fine
        let cfg = ExtractConfig {
            track_duration: 3600.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn contrast_bands_checked_only_for_contrast_kinds() {
        let mfcc = ExtractConfig {
            contrast_bands: 12,
            ..Default::default()
        };
        assert!(mfcc.validate().is_ok());

        let contrast = ExtractConfig {
            contrast_bands: 12,
            feature: FeatureKind::SpectralContrast,
            ..Default::default()
        };
        assert!(matches!(
            contrast.validate(),
            Err(ConfigError::Invalid { name: "contrast_bands", .. })
        ));

        // 200 * 2^5 = 6400 Hz, below the 11025 Hz Nyquist
        let default_contrast = ExtractConfig {
            feature: FeatureKind::SpectralContrast,
            ..Default::default()
        };
        assert!(default_contrast.validate().is_ok());
    }

    #[test]
    fn more_coefficients_than_mel_bands_rejected() {
        let cfg = ExtractConfig {
            num_coefficients: 40,
            n_mels: 20,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { name: "num_coefficients", .. })
        ));

        // Chroma has no mel stage, so 40 bins are fine
        let chroma = ExtractConfig {
            feature: FeatureKind::Chroma,
            ..cfg
        };
        assert!(chroma.validate().is_ok());
    }

    #[test]
    fn resolve_workers_prefers_explicit_count() {
        let cfg = ExtractConfig {
            workers: 3,
            ..Default::default()
        };
        assert_eq!(cfg.resolve_workers(), 3);
        assert!(ExtractConfig::default().resolve_workers() >= 1);
    }

    #[test]
    fn load_toml_with_partial_extract_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "dataset_path = \"artist10\"\nmode = \"artist\"\n\n[extract]\nnum_segments = 5\nfeature = \"spectral-contrast\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.dataset_path, Some(PathBuf::from("artist10")));
        assert_eq!(config.mode, Some(LabelMode::Artist));
        assert_eq!(config.extract.num_segments, 5);
        assert_eq!(config.extract.feature, FeatureKind::SpectralContrast);
        // Untouched fields keep their defaults
        assert_eq!(config.extract.hop_length, 512);
        assert_eq!(config.extract.sample_rate, 22050);
    }

    #[test]
    fn load_yaml_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "output_path: out/data_chroma.json\nextract:\n  feature: chroma\n  num_coefficients: 40\n  n_fft: 512\n  hop_length: 256\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.output_path, Some(PathBuf::from("out/data_chroma.json")));
        assert_eq!(config.extract.feature, FeatureKind::Chroma);
        assert_eq!(config.extract.num_coefficients, 40);
        assert_eq!(config.extract.n_fft, 512);
        assert_eq!(config.extract.hop_length, 256);
    }

    #[test]
    fn builtin_defaults_apply_without_file_or_flags() {
        let config = AppConfig::default();
        assert_eq!(
            config.extract.with_overrides(&ExtractOverrides::default()),
            ExtractConfig::default()
        );
        assert_eq!(config.dataset_root(None), PathBuf::from("genres"));
        assert_eq!(config.output(None), PathBuf::from("data.json"));
        assert_eq!(config.label_mode(None), LabelMode::Genre);
    }

    #[test]
    fn config_file_beats_defaults_and_flags_beat_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "dataset_path = \"artists\"\noutput_path = \"from_file.json\"\nmode = \"artist\"\n\n[extract]\nnum_segments = 5\nhop_length = 256\nn_mels = 64\n",
        )
        .unwrap();
        let config = AppConfig::load_from(&path).unwrap();

        // File over defaults
        let from_file = config.extract.with_overrides(&ExtractOverrides::default());
        assert_eq!(from_file.num_segments, 5);
        assert_eq!(from_file.hop_length, 256);
        assert_eq!(from_file.n_fft, 2048);
        assert_eq!(config.dataset_root(None), PathBuf::from("artists"));
        assert_eq!(config.output(None), PathBuf::from("from_file.json"));
        assert_eq!(config.label_mode(None), LabelMode::Artist);

        // Flags over file
        let overrides = ExtractOverrides {
            num_segments: Some(3),
            feature: Some(FeatureKind::Chroma),
            workers: Some(1),
            ..Default::default()
        };
        let merged = config.extract.with_overrides(&overrides);
        assert_eq!(merged.num_segments, 3);
        assert_eq!(merged.feature, FeatureKind::Chroma);
        assert_eq!(merged.workers, 1);
        // Not overridable from the command line, so the file value survives
        assert_eq!(merged.n_mels, 64);
        assert_eq!(merged.hop_length, 256);
        assert_eq!(
            config.dataset_root(Some(PathBuf::from("cli_root"))),
            PathBuf::from("cli_root")
        );
        assert_eq!(
            config.output(Some(PathBuf::from("cli.json"))),
            PathBuf::from("cli.json")
        );
        assert_eq!(config.label_mode(Some(LabelMode::Genre)), LabelMode::Genre);
    }

    #[test]
    fn unparsable_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[extract\nnum_segments = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
