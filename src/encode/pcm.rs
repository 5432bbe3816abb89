//! Sample-range slicing and 16-bit conversion shared by the local encoders.

use crate::selection::Selection;
use crate::signal::Signal;

/// Frame window of a signal selected for encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRange {
    pub start: usize,
    pub end: usize,
}

impl FrameRange {
    /// Frames covered by `selection`, floored to whole frames; the whole
    /// signal when `selection` is `None`.
    pub fn for_selection(signal: &Signal, selection: Option<Selection>) -> Self {
        match selection {
            Some(selection) => Self {
                start: signal.frame_at(selection.start()),
                end: signal.frame_at(selection.end()),
            },
            None => Self {
                start: 0,
                end: signal.frame_count(),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration of the window at `sample_rate`.
    pub fn seconds(&self, sample_rate: u32) -> f64 {
        self.len() as f64 / sample_rate.max(1) as f64
    }
}

/// Float sample to signed 16-bit, clamping to `[-1, 1]` first.
pub fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// The selected window of each channel.
pub fn slice_channels<'a>(signal: &'a Signal, range: FrameRange) -> Vec<&'a [f32]> {
    signal
        .channels()
        .map(|channel| &channel[range.start..range.end])
        .collect()
}

/// Interleave planar channels into 16-bit frames.
pub fn interleave_i16(channels: &[&[f32]]) -> Vec<i16> {
    let frames = channels.first().map(|channel| channel.len()).unwrap_or(0);
    let mut out = Vec::with_capacity(frames * channels.len());
    for frame in 0..frames {
        for channel in channels {
            out.push(to_i16(channel[frame]));
        }
    }
    out
}
