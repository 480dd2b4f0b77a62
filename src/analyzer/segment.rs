use crate::config::ExtractConfig;
use std::ops::Range;

/// Fixed segment layout derived from configuration alone.
///
/// Segment positions never depend on a track's decoded length: a short track
/// gets truncated or empty late segments, a long one is only partially used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    pub num_segments: usize,
    /// `floor(sample_rate * track_duration)`.
    pub samples_per_track: usize,
    /// `floor(samples_per_track / num_segments)`.
    pub segment_length: usize,
    pub hop_length: usize,
}

/// One positional slice of a track.
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    pub index: usize,
    pub samples: &'a [f32],
}

impl Segment<'_> {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl SegmentPlan {
    pub fn new(config: &ExtractConfig) -> Self {
        let samples_per_track = config.sample_rate as f64 * config.track_duration;
        let segment_length = (samples_per_track / config.num_segments as f64).floor() as usize;
        Self {
            num_segments: config.num_segments,
            samples_per_track: samples_per_track.floor() as usize,
            segment_length,
            hop_length: config.hop_length,
        }
    }

    /// Frames a full-length segment must yield to be kept:
    /// `ceil(segment_length / hop_length)`.
    pub fn expected_frames(&self) -> usize {
        self.segment_length.div_ceil(self.hop_length)
    }

    /// A centered STFT of `n` samples yields `n / hop + 1` frames, so when the
    /// segment length is a multiple of the hop no segment can ever match.
    pub fn rejects_every_segment(&self) -> bool {
        self.segment_length % self.hop_length == 0
    }

    /// Nominal sample range of segment `index`.
    pub fn range(&self, index: usize) -> Range<usize> {
        let start = self.segment_length.saturating_mul(index);
        start..start.saturating_add(self.segment_length)
    }

    /// Segment `index` applied to the decoded samples, clamped to their length.
    pub fn slice<'a>(&self, samples: &'a [f32], index: usize) -> &'a [f32] {
        let range = self.range(index);
        let end = range.end.min(samples.len());
        let start = range.start.min(end);
        &samples[start..end]
    }

    /// All `num_segments` segments of a track, in order.
    pub fn segments<'a>(&self, samples: &'a [f32]) -> impl Iterator<Item = Segment<'a>> + 'a {
        let plan = *self;
        (0..plan.num_segments).map(move |index| Segment {
            index,
            samples: plan.slice(samples, index),
        })
    }
}
