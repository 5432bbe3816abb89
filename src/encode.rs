//! Format/quality-driven encode dispatch.
//!
//! Two strategies exist: a single-pass external transcode of the original
//! file, or local decode-then-encode with a per-format encoder. Formats the
//! host cannot encode are substituted (AAC to MP3, FLAC to WAV) with a
//! surfaced warning.

mod cancel;
pub mod capture;
mod dispatcher;
pub mod engine;
mod error;
mod format;
pub mod mp3;
mod pcm;
mod probe;
mod wav;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::selection::Selection;
use crate::signal::Signal;

pub use cancel::{CancelToken, CooperativeYield};
pub use capture::{CaptureBackend, CaptureSession, FfmpegCapture, PlaybackGraph};
pub use dispatcher::{DispatchOptions, EncodeDispatcher};
pub use engine::{FfmpegEngine, TranscodeEngine, TranscodeJob, TrimWindow};
pub use error::{EncodeError, EngineInitError, EngineInitKind, RecordingError};
pub use format::{OutputFormat, QualityTier, bitrate_for};
pub use mp3::{LameBackend, Mp3Backend, StreamingEncoder};
pub use pcm::FrameRange;
pub use probe::{CapabilityProbe, HostProfile, container_of};
pub use wav::encode_wav;

/// Which strategy configuration asks for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyPreference {
    /// Decode locally, then encode the selected samples.
    #[default]
    Local,
    /// Hand the whole job to the transcoding engine.
    External,
}

impl std::str::FromStr for StrategyPreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StrategyPreference::Local),
            "external" => Ok(StrategyPreference::External),
            _ => Err(format!("Unknown strategy '{value}' (expected local or external)")),
        }
    }
}

/// Strategy that actually produced a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    ExternalTranscode,
    DirectEncode,
    RecordingCapture,
}

/// Non-fatal condition surfaced alongside a result.
#[derive(Clone, Debug, PartialEq)]
pub enum EncodeWarning {
    /// `requested` could not be produced here; `delivered` was used instead.
    Substituted {
        requested: OutputFormat,
        delivered: OutputFormat,
        reason: String,
    },
    /// Capture hit its wall-clock limit; output may be truncated.
    RecordingTimedOut { after_secs: u64 },
}

impl fmt::Display for EncodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeWarning::Substituted {
                requested,
                delivered,
                reason,
            } => write!(
                f,
                "{} output is unavailable ({reason}); delivered {} instead",
                requested.extension().to_ascii_uppercase(),
                delivered.extension().to_ascii_uppercase()
            ),
            EncodeWarning::RecordingTimedOut { after_secs } => write!(
                f,
                "Recording stopped after {after_secs}s; output may be incomplete"
            ),
        }
    }
}

/// One encode invocation's input.
#[derive(Clone, Copy, Debug)]
pub struct EncodeRequest<'a> {
    /// Original file name, used for container detection and the output name.
    pub source_name: &'a str,
    pub source_bytes: &'a [u8],
    /// Already-decoded signal, when available.
    pub signal: Option<&'a Signal>,
    /// Selected range; `None` means the whole input.
    pub selection: Option<Selection>,
    pub format: OutputFormat,
    pub tier: QualityTier,
    /// The user accepted audible real-time capture.
    pub capture_acknowledged: bool,
}

impl<'a> EncodeRequest<'a> {
    pub fn new(source_name: &'a str, source_bytes: &'a [u8]) -> Self {
        Self {
            source_name,
            source_bytes,
            signal: None,
            selection: None,
            format: OutputFormat::default(),
            tier: QualityTier::default(),
            capture_acknowledged: false,
        }
    }

    pub fn with_signal(mut self, signal: &'a Signal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn with_format(mut self, format: OutputFormat, tier: QualityTier) -> Self {
        self.format = format;
        self.tier = tier;
        self
    }

    pub fn acknowledge_capture(mut self) -> Self {
        self.capture_acknowledged = true;
        self
    }

    /// Selection narrower than the whole input.
    ///
    /// Without a decoded signal any explicit selection counts as a trim.
    pub fn trim(&self) -> Option<Selection> {
        let selection = self.selection?;
        match self.signal {
            Some(signal) if selection.is_full_range(signal.duration()) => None,
            _ => Some(selection),
        }
    }
}
