use std::fmt;

use thiserror::Error;

use super::OutputFormat;
use crate::signal::DecodeError;

/// Coarse cause of an engine start-up failure, used for the user hint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineInitKind {
    /// Engine binary or assets were not found.
    NotFound,
    /// Engine assets could not be fetched.
    Network,
    Other,
}

impl EngineInitKind {
    /// Short hint appended to status messages.
    pub fn hint(self) -> &'static str {
        match self {
            EngineInitKind::NotFound => "engine files were not found; check the install location",
            EngineInitKind::Network => "engine files could not be fetched; check the connection",
            EngineInitKind::Other => "engine failed to start",
        }
    }

    /// Guess the category from raw error text.
    pub fn from_message(message: &str) -> Self {
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("404") || lowered.contains("not found") {
            EngineInitKind::NotFound
        } else if lowered.contains("network") || lowered.contains("connection") {
            EngineInitKind::Network
        } else {
            EngineInitKind::Other
        }
    }

    /// Category for an I/O failure while starting the engine.
    pub fn from_io(error: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match error.kind() {
            ErrorKind::NotFound => EngineInitKind::NotFound,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::TimedOut => EngineInitKind::Network,
            _ => EngineInitKind::from_message(&error.to_string()),
        }
    }
}

impl fmt::Display for EngineInitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineInitKind::NotFound => "not found",
            EngineInitKind::Network => "network",
            EngineInitKind::Other => "other",
        })
    }
}

/// The single-pass transcoding engine could not be started.
#[derive(Debug, Error)]
#[error("Transcoding engine failed to initialize ({kind}: {}): {message}", kind.hint())]
pub struct EngineInitError {
    pub kind: EngineInitKind,
    pub message: String,
}

impl EngineInitError {
    pub fn new(kind: EngineInitKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build from raw text, categorizing it.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: EngineInitKind::from_message(&message),
            message,
        }
    }
}

/// Failure in the playback-capture path.
#[derive(Debug, Error)]
pub enum RecordingError {
    /// The playback graph or its temporary resources could not be prepared.
    #[error("Failed to prepare playback for capture: {message}")]
    Graph { message: String },
    /// The recorder failed while capturing.
    #[error("Capture recorder failed: {message}")]
    Recorder { message: String },
    /// No capture signature exists at all.
    #[error("No capture output format is available")]
    NoSignature,
}

/// Errors raised by the encode dispatcher.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// No encoder for `format` exists here; triggers the documented fallback.
    #[error("No {format} encoder is available: {reason}")]
    EncoderUnavailable {
        format: OutputFormat,
        reason: String,
    },
    #[error(transparent)]
    EngineInit(#[from] EngineInitError),
    /// The engine started but the job failed.
    #[error("Transcoding failed: {message}")]
    Engine { message: String },
    #[error(transparent)]
    Recording(#[from] RecordingError),
    /// A local encoder rejected its input or configuration.
    #[error("{format} encoding failed: {message}")]
    Encoder {
        format: OutputFormat,
        message: String,
    },
    /// The selection does not cover any audio.
    #[error("Selection {start:.3}s-{end:.3}s does not cover any audio")]
    InvalidSelection { start: f64, end: f64 },
    /// The encoder finished but produced zero bytes.
    #[error("Encoding produced an empty output")]
    EmptyOutput,
    /// Capture mode plays audio aloud in real time and needs consent first.
    #[error("Recording capture must be acknowledged before it starts")]
    AcknowledgmentRequired,
    #[error("Encoding was cancelled")]
    Cancelled,
}

impl EncodeError {
    pub(crate) fn encoder(format: OutputFormat, message: impl fmt::Display) -> Self {
        EncodeError::Encoder {
            format,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_engine_messages() {
        assert_eq!(
            EngineInitKind::from_message("HTTP 404 while loading core"),
            EngineInitKind::NotFound
        );
        assert_eq!(
            EngineInitKind::from_message("network unreachable"),
            EngineInitKind::Network
        );
        assert_eq!(
            EngineInitKind::from_message("bad wasm magic"),
            EngineInitKind::Other
        );
    }

    #[test]
    fn categorizes_io_errors() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        assert_eq!(EngineInitKind::from_io(&missing), EngineInitKind::NotFound);
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(EngineInitKind::from_io(&refused), EngineInitKind::Network);
    }

    #[test]
    fn init_error_message_keeps_raw_text() {
        let error = EngineInitError::from_message("ffmpeg: not found");
        let text = error.to_string();
        assert!(text.contains("not found"));
        assert!(text.contains("ffmpeg: not found"));
    }
}
