pub mod decode;
pub mod segment;

use crate::config::{ConfigError, ExtractConfig};
use crate::dataset::{Dataset, DatasetError, Matrix};
use crate::scanner::{self, LabelMode, LabeledTrack, ScanError};
use crate::transform::{self, FeatureExtractor, TransformError};
use decode::{DecodeError, Decoder};
use indicatif::{ProgressBar, ProgressStyle};
use segment::SegmentPlan;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Traversal error: {0}")]
    Scan(#[from] ScanError),
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("failed to start worker pool: {0}")]
    Pool(String),
}

/// Counters for one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractSummary {
    pub classes: usize,
    pub tracks_found: u64,
    pub unsupported: u64,
    pub decoded: u64,
    pub decode_failures: u64,
    pub segments_kept: u64,
    pub shape_mismatches: u64,
    /// Slices shorter than the nominal segment length (kept or not).
    pub short_segments: u64,
    pub transform_failures: u64,
    /// Kept segments per class, in mapping order.
    pub per_class: Vec<(String, u64)>,
}

pub struct ExtractResult {
    pub dataset: Dataset,
    pub summary: ExtractSummary,
}

/// Everything one track contributed, before it is merged into the dataset.
#[derive(Debug, Default)]
struct TrackFeatures {
    matrices: Vec<Matrix>,
    shape_mismatches: u64,
    short_segments: u64,
    transform_failures: u64,
}

/// Build a labeled dataset from a directory tree.
///
/// Tracks are decoded and transformed in parallel, one file per task, in
/// chunks of `workers * 2`. Each chunk's results come back in traversal order
/// and are merged sequentially, so the dataset does not depend on the worker
/// count.
pub fn extract_dataset(
    root: &Path,
    mode: LabelMode,
    config: &ExtractConfig,
    decoder: &dyn Decoder,
    filter: Option<&str>,
) -> Result<ExtractResult, ExtractError> {
    config.validate()?;

    let plan = SegmentPlan::new(config);
    let expected_frames = plan.expected_frames();
    if plan.rejects_every_segment() {
        log::warn!(
            "segment length {} is a multiple of hop length {}: every segment yields {} frames \
             instead of {} and will be dropped",
            plan.segment_length,
            plan.hop_length,
            expected_frames + 1,
            expected_frames
        );
    }

    let traversal = scanner::walk(root, mode)?;
    let tracks_found = traversal.tracks.len() as u64;

    // Labels come from the full traversal so indices stay stable under a filter
    let tracks: Vec<LabeledTrack> = if let Some(pattern) = filter {
        let pattern_lower = pattern.to_lowercase();
        traversal
            .tracks
            .into_iter()
            .filter(|t| {
                t.path
                    .to_string_lossy()
                    .to_lowercase()
                    .contains(&pattern_lower)
            })
            .collect()
    } else {
        traversal.tracks
    };

    let mut dataset = Dataset::new(traversal.mapping.into_names());
    let mut summary = ExtractSummary {
        classes: dataset.mapping.len(),
        tracks_found,
        unsupported: traversal.unsupported,
        ..Default::default()
    };

    let extractor = FeatureExtractor::from_config(config)?;
    let workers = config.resolve_workers();

    log::info!(
        "Extracting {} from {} tracks with {} workers ({} segments of {} samples, {} frames each)",
        config.feature,
        tracks.len(),
        workers,
        plan.num_segments,
        plan.segment_length,
        expected_frames
    );

    let pb = ProgressBar::new(tracks.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| ExtractError::Pool(e.to_string()))?;

    let chunk_size = workers * 2;
    let mut current_class: Option<usize> = None;

    for chunk in tracks.chunks(chunk_size) {
        let results: Vec<_> = pool.install(|| {
            use rayon::prelude::*;
            chunk
                .par_iter()
                .map(|track| {
                    let result = process_track(track, &plan, &extractor, config, decoder);
                    pb.inc(1);
                    result
                })
                .collect()
        });

        for (track, result) in chunk.iter().zip(results) {
            if current_class != Some(track.label) {
                log::info!("Processing class {} ({})", track.label, track.class_name);
                current_class = Some(track.label);
            }

            match result {
                Ok(features) => {
                    summary.decoded += 1;
                    summary.shape_mismatches += features.shape_mismatches;
                    summary.short_segments += features.short_segments;
                    summary.transform_failures += features.transform_failures;
                    for matrix in features.matrices {
                        dataset.push(track.label, matrix)?;
                        summary.segments_kept += 1;
                    }
                }
                Err(e) => {
                    log::warn!("Skipping {}: {}", track.path.display(), e);
                    summary.decode_failures += 1;
                }
            }
        }

        pb.set_message(format!(
            "{} segments, {} failed",
            summary.segments_kept, summary.decode_failures
        ));
    }

    pb.finish_with_message(format!(
        "Done: {} segments from {} tracks",
        summary.segments_kept, summary.decoded
    ));

    summary.per_class = dataset
        .class_counts()
        .into_iter()
        .map(|(name, count)| (name.to_string(), count as u64))
        .collect();

    log::info!(
        "Kept {} segments from {} tracks ({} decode failures, {} shape mismatches, {} short segments)",
        summary.segments_kept,
        summary.decoded,
        summary.decode_failures,
        summary.shape_mismatches,
        summary.short_segments
    );

    Ok(ExtractResult { dataset, summary })
}

/// Extract a dataset and write it to `output`.
pub fn run(
    root: &Path,
    mode: LabelMode,
    config: &ExtractConfig,
    decoder: &dyn Decoder,
    filter: Option<&str>,
    output: &Path,
) -> Result<ExtractResult, ExtractError> {
    let result = extract_dataset(root, mode, config, decoder, filter)?;
    result.dataset.save(output)?;
    Ok(result)
}

/// Decode one track and keep every segment whose matrix has exactly the
/// expected number of frames.
fn process_track(
    track: &LabeledTrack,
    plan: &SegmentPlan,
    extractor: &FeatureExtractor,
    config: &ExtractConfig,
    decoder: &dyn Decoder,
) -> Result<TrackFeatures, DecodeError> {
    log::debug!("Processing {}", track.path.display());

    let audio = decoder.decode(&track.path, config.sample_rate)?;
    let mut out = TrackFeatures::default();

    // A decoder that could not hit the target rate gets its own filterbanks
    let local;
    let extractor = if audio.sample_rate == extractor.sample_rate() {
        extractor
    } else {
        log::warn!(
            "{} decoded at {} Hz instead of {} Hz",
            track.path.display(),
            audio.sample_rate,
            extractor.sample_rate()
        );
        match FeatureExtractor::new(*extractor.params(), audio.sample_rate) {
            Ok(fx) => {
                local = fx;
                &local
            }
            Err(e) => {
                log::debug!("No transform for {}: {}", track.path.display(), e);
                out.transform_failures = plan.num_segments as u64;
                return Ok(out);
            }
        }
    };

    let expected = plan.expected_frames();
    for segment in plan.segments(&audio.samples) {
        if segment.len() < plan.segment_length {
            out.short_segments += 1;
        }
        match extractor.extract(segment.samples) {
            Ok(matrix) if matrix.nrows() == expected => {
                out.matrices.push(transform::to_rows(&matrix));
            }
            Ok(matrix) => {
                log::trace!(
                    "{} segment {}: {} frames, expected {}",
                    track.path.display(),
                    segment.index,
                    matrix.nrows(),
                    expected
                );
                out.shape_mismatches += 1;
            }
            Err(e) => {
                log::debug!(
                    "{} segment {}: transform failed: {}",
                    track.path.display(),
                    segment.index,
                    e
                );
                out.transform_failures += 1;
            }
        }
    }

    Ok(out)
}
