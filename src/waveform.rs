//! Waveform preview reduction.
//!
//! The preview is a short sequence of normalized magnitudes used only for
//! drawing the timeline; the encoder never reads it.

use crate::signal::Signal;

/// Bucket count used by the timeline preview.
pub const DEFAULT_BUCKET_COUNT: usize = 200;

/// Fraction of the timeline height the tallest bar may occupy.
const BAR_HEIGHT_FRACTION: f32 = 0.8;

/// Normalized per-bucket magnitudes in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveformPreview {
    buckets: Vec<f32>,
    silent: bool,
}

/// One rectangle of the bar rendering, in timeline pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PreviewBar {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl WaveformPreview {
    /// Normalized bucket values.
    pub fn buckets(&self) -> &[f32] {
        &self.buckets
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True when there are no buckets.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// True when the input had no usable signal and every bucket is zero.
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Lay the buckets out as centred bars over a `width` x `height` timeline.
    pub fn bars(&self, width: f32, height: f32) -> Vec<PreviewBar> {
        if self.buckets.is_empty() || width <= 0.0 || height <= 0.0 {
            return Vec::new();
        }
        let bar_width = width / self.buckets.len() as f32;
        let centre = height / 2.0;
        self.buckets
            .iter()
            .enumerate()
            .map(|(index, value)| {
                let bar_height = value * height * BAR_HEIGHT_FRACTION;
                PreviewBar {
                    x: index as f32 * bar_width,
                    y: centre - bar_height / 2.0,
                    width: (bar_width - 1.0).max(0.0),
                    height: bar_height,
                }
            })
            .collect()
    }
}

/// Reduce the first channel of `signal` to `bucket_count` normalized magnitudes.
///
/// Samples are split into equal contiguous blocks (remainder samples past the
/// last full block are dropped), each block becomes its mean absolute
/// amplitude, and the sequence is divided by its maximum. A silent channel,
/// or one shorter than `bucket_count`, yields all zeros flagged as silent.
pub fn reduce(signal: &Signal, bucket_count: usize) -> WaveformPreview {
    reduce_samples(signal.channel(0).unwrap_or(&[]), bucket_count)
}

/// Reduction over a raw sample slice.
pub fn reduce_samples(samples: &[f32], bucket_count: usize) -> WaveformPreview {
    let block_size = if bucket_count == 0 {
        0
    } else {
        samples.len() / bucket_count
    };
    if block_size == 0 {
        return silent(bucket_count);
    }

    let means: Vec<f32> = samples
        .chunks_exact(block_size)
        .take(bucket_count)
        .map(|block| {
            let sum: f64 = block
                .iter()
                .filter(|sample| sample.is_finite())
                .map(|sample| sample.abs() as f64)
                .sum();
            (sum / block_size as f64) as f32
        })
        .collect();

    let peak = means.iter().copied().fold(0.0_f32, f32::max);
    if peak <= 0.0 || !peak.is_finite() {
        return silent(bucket_count);
    }
    WaveformPreview {
        buckets: means
            .into_iter()
            .map(|value| (value / peak).clamp(0.0, 1.0))
            .collect(),
        silent: false,
    }
}

fn silent(bucket_count: usize) -> WaveformPreview {
    WaveformPreview {
        buckets: vec![0.0; bucket_count],
        silent: true,
    }
}
