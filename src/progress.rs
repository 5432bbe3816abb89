//! Progress percentage mapping and the terminal artifact descriptor.

use std::path::Path;

use serde::Serialize;

use crate::encode::{EncodeWarning, OutputFormat, QualityTier, StrategyKind};

/// Internal phase of one encode invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodePhase {
    Preparing,
    Decoding,
    Trimming,
    Encoding,
    Recording,
    Validating,
    Done,
}

impl EncodePhase {
    /// Share of the overall percentage reserved for the phase on the
    /// decode-then-encode path.
    pub fn local_range(self) -> (f32, f32) {
        match self {
            EncodePhase::Preparing => (0.0, 0.0),
            EncodePhase::Decoding => (0.0, 10.0),
            EncodePhase::Trimming => (10.0, 15.0),
            EncodePhase::Encoding | EncodePhase::Recording => (15.0, 95.0),
            EncodePhase::Validating => (95.0, 100.0),
            EncodePhase::Done => (100.0, 100.0),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EncodePhase::Preparing => "preparing",
            EncodePhase::Decoding => "decoding",
            EncodePhase::Trimming => "trimming",
            EncodePhase::Encoding => "encoding",
            EncodePhase::Recording => "recording",
            EncodePhase::Validating => "validating",
            EncodePhase::Done => "done",
        }
    }
}

/// One progress notification.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressUpdate {
    pub phase: EncodePhase,
    /// Overall percentage in `[0, 100]`.
    pub percent: f32,
}

/// Receiver of progress notifications.
pub trait ProgressSink {
    fn on_progress(&mut self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: FnMut(ProgressUpdate),
{
    fn on_progress(&mut self, update: ProgressUpdate) {
        self(update)
    }
}

/// Sink that drops every update.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn on_progress(&mut self, _update: ProgressUpdate) {}
}

/// Keeps the reported percentage non-decreasing within one attempt.
pub struct ProgressReporter<'a> {
    sink: &'a mut dyn ProgressSink,
    percent: f32,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, percent: 0.0 }
    }

    /// Report an absolute percentage; values below the last one are raised
    /// to it.
    pub fn report(&mut self, phase: EncodePhase, percent: f32) {
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            self.percent
        };
        self.percent = self.percent.max(percent);
        self.sink.on_progress(ProgressUpdate {
            phase,
            percent: self.percent,
        });
    }

    /// Report `fraction` of the way through the phase's local range.
    pub fn report_fraction(&mut self, phase: EncodePhase, fraction: f32) {
        let (low, high) = phase.local_range();
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.report(phase, low + (high - low) * fraction);
    }

    /// Start a new attempt after a fallback substitution; the counter may
    /// go back to zero.
    pub fn restart(&mut self) {
        self.percent = 0.0;
    }

    pub fn percent(&self) -> f32 {
        self.percent
    }
}

/// Successful output of one encode invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodeResult {
    pub bytes: Vec<u8>,
    /// Format actually delivered, after any substitution.
    pub format: OutputFormat,
    /// Format the caller asked for.
    pub requested_format: OutputFormat,
    pub tier: QualityTier,
    pub suggested_filename: String,
    pub achieved_duration: f64,
    pub strategy: StrategyKind,
    pub warnings: Vec<EncodeWarning>,
}

impl EncodeResult {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn describe(&self) -> ArtifactDescriptor {
        ArtifactDescriptor {
            filename: self.suggested_filename.clone(),
            mime_type: self.mime_type().to_string(),
            size_bytes: self.size_bytes(),
            size_label: format_size_mb(self.size_bytes()),
            achieved_duration_secs: self.achieved_duration,
            format: self.format,
            requested_format: self.requested_format,
            strategy: self.strategy,
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Serializable summary of a result, without the payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArtifactDescriptor {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub size_label: String,
    pub achieved_duration_secs: f64,
    pub format: OutputFormat,
    pub requested_format: OutputFormat,
    pub strategy: StrategyKind,
    pub warnings: Vec<String>,
}

/// `<base>_audio[_<tier>][_clip].<ext>` for the delivered format.
pub fn suggested_filename(
    source_name: &str,
    format: OutputFormat,
    tier: QualityTier,
    clipped: bool,
) -> String {
    let base = strip_extension(source_name);
    let tier_suffix = match format {
        OutputFormat::Mp3 | OutputFormat::Aac => format!("_{}", tier.name()),
        OutputFormat::Wav | OutputFormat::Flac => String::new(),
    };
    let clip_suffix = if clipped { "_clip" } else { "" };
    format!("{base}_audio{tier_suffix}{clip_suffix}.{}", format.extension())
}

fn strip_extension(name: &str) -> &str {
    let file_name = Path::new(name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(name);
    match file_name.rfind('.') {
        Some(0) | None => file_name,
        Some(index) => &file_name[..index],
    }
}

/// Megabytes with one decimal, e.g. `12.3MB`.
pub fn format_size_mb(bytes: u64) -> String {
    format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reporter_never_goes_backwards() {
        let mut seen = Vec::new();
        let mut sink = |update: ProgressUpdate| seen.push(update.percent);
        let mut reporter = ProgressReporter::new(&mut sink);
        reporter.report(EncodePhase::Preparing, 40.0);
        reporter.report(EncodePhase::Encoding, 25.0);
        reporter.report(EncodePhase::Encoding, 60.0);
        reporter.report(EncodePhase::Done, 250.0);
        drop(reporter);
        assert_eq!(seen, vec![40.0, 40.0, 60.0, 100.0]);
    }

    #[test]
    fn restart_allows_counter_to_drop() {
        let mut seen = Vec::new();
        let mut sink = |update: ProgressUpdate| seen.push(update.percent);
        let mut reporter = ProgressReporter::new(&mut sink);
        reporter.report_fraction(EncodePhase::Encoding, 0.5);
        reporter.restart();
        reporter.report_fraction(EncodePhase::Decoding, 0.5);
        drop(reporter);
        assert_eq!(seen, vec![55.0, 5.0]);
    }

    #[test]
    fn phase_fractions_map_into_reserved_ranges() {
        let mut sink = NullProgress;
        let mut reporter = ProgressReporter::new(&mut sink);
        reporter.report_fraction(EncodePhase::Trimming, 1.0);
        assert_eq!(reporter.percent(), 15.0);
        reporter.report_fraction(EncodePhase::Validating, f32::NAN);
        assert_eq!(reporter.percent(), 95.0);
    }

    #[test]
    fn filename_carries_tier_and_clip_suffixes() {
        assert_eq!(
            suggested_filename("clip.mp4", OutputFormat::Mp3, QualityTier::Medium, false),
            "clip_audio_medium.mp3"
        );
        assert_eq!(
            suggested_filename("talk.final.mov", OutputFormat::Aac, QualityTier::UltraLow, true),
            "talk.final_audio_ultra-low_clip.aac"
        );
        assert_eq!(
            suggested_filename("clip.mp4", OutputFormat::Wav, QualityTier::High, true),
            "clip_audio_clip.wav"
        );
        assert_eq!(
            suggested_filename("noext", OutputFormat::Flac, QualityTier::Low, false),
            "noext_audio.flac"
        );
    }

    #[test]
    fn size_renders_one_decimal_megabytes() {
        assert_eq!(format_size_mb(0), "0.0MB");
        assert_eq!(format_size_mb(1_572_864), "1.5MB");
    }
}
