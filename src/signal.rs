//! Decoded audio signal and the decoder that produces it.

mod decode;

pub use decode::{DecodeError, decode, decode_with_hint};

/// Decoded audio as planar `f32` channels plus sample-rate metadata.
///
/// A signal is immutable once produced; the owning session drops it on reset
/// or when a new file replaces it.
#[derive(Clone, Debug, PartialEq)]
pub struct Signal {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl Signal {
    /// Build a signal from planar channel data.
    ///
    /// Returns `None` when the rate is zero, no channel is given, or the
    /// channels disagree on length.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Option<Self> {
        if sample_rate == 0 || channels.is_empty() {
            return None;
        }
        let frames = channels[0].len();
        if channels.iter().any(|channel| channel.len() != frames) {
            return None;
        }
        Some(Self {
            sample_rate,
            channels,
        })
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels (always at least one).
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn frame_count(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// Duration in seconds, derived from frame count and rate.
    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Samples of a single channel.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// All channels in order.
    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    /// Frame index for a time in seconds, floored and clamped to the signal.
    pub fn frame_at(&self, seconds: f64) -> usize {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        let frame = (seconds * self.sample_rate as f64).floor();
        (frame as usize).min(self.frame_count())
    }
}
