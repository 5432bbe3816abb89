//! Time-range selection over a decoded signal.
//!
//! Selection math is kept pure so the interaction controller and text fields
//! can both drive it, and so the invariants are testable in isolation.

mod timecode;

pub use timecode::{format_timecode, normalize_timecode_text, parse_timecode};

/// Smallest span, in seconds, a dragged selection may have.
pub const MIN_SPAN_SECONDS: f64 = 0.1;

/// A time range `[start, end)` in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Selection {
    start: f64,
    end: f64,
}

impl Selection {
    /// Range starting at zero and covering `duration`.
    pub fn full(duration: f64) -> Self {
        Self {
            start: 0.0,
            end: sanitize_duration(duration),
        }
    }

    /// Start of the range in seconds.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// End of the range in seconds.
    pub fn end(&self) -> f64 {
        self.end
    }

    /// Length of the range in seconds.
    pub fn span(&self) -> f64 {
        self.end - self.start
    }

    /// True when the range is exactly `{0, duration}`.
    pub fn is_full_range(&self, duration: f64) -> bool {
        self.start == 0.0 && self.end == sanitize_duration(duration)
    }
}

/// The selection edge a gesture is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionEdge {
    /// The starting edge.
    Start,
    /// The ending edge.
    End,
}

/// Which text field an edit failed on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldValidity {
    /// The start field parsed and passed the bound checks.
    pub start_valid: bool,
    /// The end field parsed and passed the bound checks.
    pub end_valid: bool,
}

impl FieldValidity {
    /// True when both fields are valid.
    pub fn all_valid(&self) -> bool {
        self.start_valid && self.end_valid
    }
}

/// Result of applying a manual text edit to the selection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextEditOutcome {
    /// Per-field validity flags for the UI to mark.
    pub validity: FieldValidity,
    /// The committed selection, if the edit was accepted.
    pub committed: Option<Selection>,
}

/// Selection state bound to a signal duration.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionModel {
    duration: f64,
    selection: Selection,
}

impl SelectionModel {
    /// Create a model covering the whole duration.
    pub fn new(duration: f64) -> Self {
        let duration = sanitize_duration(duration);
        Self {
            duration,
            selection: Selection::full(duration),
        }
    }

    /// Duration of the underlying signal in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Current selection.
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// True when the selection is the untrimmed default.
    pub fn is_full_range(&self) -> bool {
        self.selection.is_full_range(self.duration)
    }

    /// Rebind to a new duration and select all of it.
    pub fn set_full_range(&mut self, duration: f64) {
        self.duration = sanitize_duration(duration);
        self.selection = Selection::full(self.duration);
    }

    /// Select all of the current duration.
    pub fn reset(&mut self) {
        self.selection = Selection::full(self.duration);
    }

    /// Set both bounds, clamping into `[0, duration]`.
    ///
    /// An inverted or empty range is widened to `start + MIN_SPAN_SECONDS`,
    /// shifting left when that would overrun the duration.
    pub fn set_range(&mut self, start: f64, end: f64) -> Selection {
        let mut start = self.clamp_time(start);
        let mut end = self.clamp_time(end);
        if end <= start {
            end = start + MIN_SPAN_SECONDS;
            if end > self.duration {
                end = self.duration;
                start = (end - MIN_SPAN_SECONDS).max(0.0);
            }
        }
        self.selection = Selection { start, end };
        self.selection
    }

    /// Move only the start bound, keeping at least the minimum span.
    pub(crate) fn drag_start_to(&mut self, time: f64) {
        let time = self.clamp_time(time);
        self.selection.start = time.min(self.selection.end - MIN_SPAN_SECONDS).max(0.0);
    }

    /// Move only the end bound, keeping at least the minimum span.
    pub(crate) fn drag_end_to(&mut self, time: f64) {
        let time = self.clamp_time(time);
        self.selection.end = time
            .max(self.selection.start + MIN_SPAN_SECONDS)
            .min(self.duration);
    }

    /// Replace the selection with a range spanning `anchor` and `time`.
    pub(crate) fn span_between(&mut self, anchor: f64, time: f64) {
        let anchor = self.clamp_time(anchor);
        let time = self.clamp_time(time);
        self.selection = Selection {
            start: anchor.min(time),
            end: anchor.max(time),
        };
    }

    /// Validate manual text edits and commit them only when both fields pass.
    ///
    /// Fields must parse to non-negative times, the end must exceed the start
    /// and neither may exceed the duration.
    pub fn apply_text_edit(&mut self, start_text: &str, end_text: &str) -> TextEditOutcome {
        let start = parse_timecode(start_text).filter(|value| *value >= 0.0);
        let end = parse_timecode(end_text).filter(|value| *value >= 0.0);
        let mut validity = FieldValidity {
            start_valid: start.is_some(),
            end_valid: end.is_some(),
        };
        if let (Some(start), Some(end)) = (start, end) {
            if end <= start {
                validity.end_valid = false;
            }
            if start > self.duration || end > self.duration {
                validity.start_valid = false;
                validity.end_valid = false;
            }
            if validity.all_valid() {
                self.selection = Selection { start, end };
                return TextEditOutcome {
                    validity,
                    committed: Some(self.selection),
                };
            }
        }
        TextEditOutcome {
            validity,
            committed: None,
        }
    }

    /// Text for the start and end fields.
    pub fn timecodes(&self) -> (String, String) {
        (
            format_timecode(self.selection.start),
            format_timecode(self.selection.end),
        )
    }

    fn clamp_time(&self, time: f64) -> f64 {
        if time.is_nan() {
            return 0.0;
        }
        time.clamp(0.0, self.duration)
    }
}

fn sanitize_duration(duration: f64) -> f64 {
    if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        0.0
    }
}
