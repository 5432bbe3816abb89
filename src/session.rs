//! Per-session pipeline state.
//!
//! A [`Session`] owns the loaded file, its decoded [`Signal`], the selection,
//! the waveform preview, the audition output and the last encode result, and
//! moves between [`PipelineState`]s as operations run. Loading a new file or
//! resetting stops playback and tears everything down before anything new is
//! created.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ExtractorConfig;
use crate::encode::{
    CancelToken, EncodeDispatcher, EncodeError, EncodeRequest, OutputFormat, QualityTier,
};
use crate::interaction::{
    HitThresholds, InteractionController, InteractionOutcome, PointerEvent, TimelineGeometry,
};
use crate::playback::{AuditionClip, AuditionOutput, PlaybackError, PlaybackState, default_output};
use crate::progress::{EncodeResult, ProgressSink};
use crate::selection::{Selection, SelectionModel, TextEditOutcome};
use crate::signal::{DecodeError, Signal, decode_with_hint};
use crate::waveform::{self, DEFAULT_BUCKET_COUNT, WaveformPreview};

/// Lifecycle of one session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PipelineState {
    #[default]
    Idle,
    FileLoaded,
    WaveformReady,
    /// The file could not be decoded locally; external transcoding may
    /// still work.
    WaveformFailed,
    Encoding,
    ResultReady,
    Failed,
}

/// Session-level failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to read {path}: {source}")]
    ReadInput {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("No file is loaded")]
    NoFile,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl PipelineError {
    /// One-line user message: the most specific cause, then the raw error.
    pub fn status_message(&self) -> String {
        let (summary, detail) = match self {
            PipelineError::ReadInput { .. } => ("Could not read the input file", self.to_string()),
            PipelineError::NoFile => ("Choose a file first", String::new()),
            PipelineError::Decode(err) => ("Could not decode the audio track", err.to_string()),
            PipelineError::Encode(err) => return encode_status(err),
            PipelineError::Playback(err) => ("Could not play the selection", err.to_string()),
        };
        join_status(summary, &detail)
    }
}

fn encode_status(error: &EncodeError) -> String {
    let summary = match error {
        EncodeError::Decode(_) => "Could not decode the audio track",
        EncodeError::EngineInit(init) => {
            return join_status(
                &format!("Transcoding engine failed to load ({})", init.kind.hint()),
                &init.message,
            );
        }
        EncodeError::Engine { .. } => "Transcoding failed",
        EncodeError::EncoderUnavailable { .. } => "No encoder is available for this format",
        EncodeError::Recording(_) => "Recording capture failed",
        EncodeError::Encoder { .. } => "Encoding failed",
        EncodeError::InvalidSelection { .. } => "The selected range is not valid",
        EncodeError::EmptyOutput => "The encoder produced an empty file",
        EncodeError::AcknowledgmentRequired => {
            "This input is captured by real-time playback; confirm to continue"
        }
        EncodeError::Cancelled => "Encoding was cancelled",
    };
    join_status(summary, &error.to_string())
}

fn join_status(summary: &str, detail: &str) -> String {
    if detail.is_empty() || detail == summary {
        summary.to_string()
    } else {
        format!("{summary}: {detail}")
    }
}

/// Original file as picked by the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Explicit state for one extractor session.
pub struct Session {
    state: PipelineState,
    source: Option<SourceFile>,
    signal: Option<Signal>,
    selection: SelectionModel,
    waveform: Option<WaveformPreview>,
    interaction: InteractionController,
    result: Option<EncodeResult>,
    format: OutputFormat,
    tier: QualityTier,
    bucket_count: usize,
    cancel: CancelToken,
    audition: Box<dyn AuditionOutput>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(HitThresholds::default(), DEFAULT_BUCKET_COUNT)
    }
}

impl Session {
    pub fn new(thresholds: HitThresholds, bucket_count: usize) -> Self {
        Self {
            state: PipelineState::Idle,
            source: None,
            signal: None,
            selection: SelectionModel::new(0.0),
            waveform: None,
            interaction: InteractionController::new(thresholds),
            result: None,
            format: OutputFormat::default(),
            tier: QualityTier::default(),
            bucket_count: bucket_count.max(1),
            cancel: CancelToken::new(),
            audition: default_output(),
        }
    }

    pub fn from_config(config: &ExtractorConfig) -> Self {
        let mut session = Self::new(config.hit_thresholds(), config.pipeline.waveform_buckets);
        session.set_output(config.output.format, config.output.quality);
        session
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn source(&self) -> Option<&SourceFile> {
        self.source.as_ref()
    }

    pub fn signal(&self) -> Option<&Signal> {
        self.signal.as_ref()
    }

    pub fn selection(&self) -> Selection {
        self.selection.selection()
    }

    pub fn selection_model(&self) -> &SelectionModel {
        &self.selection
    }

    pub fn waveform(&self) -> Option<&WaveformPreview> {
        self.waveform.as_ref()
    }

    pub fn result(&self) -> Option<&EncodeResult> {
        self.result.as_ref()
    }

    pub fn output(&self) -> (OutputFormat, QualityTier) {
        (self.format, self.tier)
    }

    /// Token tripped by [`Session::reset`] and by loading another file.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn set_output(&mut self, format: OutputFormat, tier: QualityTier) {
        self.format = format;
        self.tier = tier;
    }

    /// Swap the audition output, closing the previous one.
    pub fn set_audition_output(&mut self, output: Box<dyn AuditionOutput>) {
        self.audition.release();
        self.audition = output;
    }

    /// True when an encode may be started.
    pub fn can_extract(&self) -> bool {
        self.source.is_some()
    }

    /// Drop the file, signal, preview and result and return to idle.
    pub fn reset(&mut self) {
        self.audition.release();
        self.cancel.cancel();
        self.cancel = CancelToken::new();
        self.interaction.cancel();
        self.result = None;
        self.waveform = None;
        self.signal = None;
        self.source = None;
        self.selection.set_full_range(0.0);
        self.state = PipelineState::Idle;
        debug!("Session reset");
    }

    /// Read and load a file from disk.
    pub fn load_path(&mut self, path: &Path) -> Result<(), PipelineError> {
        let bytes = std::fs::read(path).map_err(|source| PipelineError::ReadInput {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        self.load_file(name, bytes)
    }

    /// Replace the current file, decode it and build the preview.
    ///
    /// A decode failure leaves the file loaded in `WaveformFailed`.
    pub fn load_file(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> Result<(), PipelineError> {
        self.reset();
        let name = name.into();
        info!(file = %name, bytes = bytes.len(), "File loaded");
        let hint = crate::encode::container_of(&name);
        self.source = Some(SourceFile { name, bytes });
        self.state = PipelineState::FileLoaded;
        let decoded = match self.source.as_ref() {
            Some(source) => decode_with_hint(&source.bytes, hint.as_deref()),
            None => return Err(PipelineError::NoFile),
        };
        match decoded {
            Ok(signal) => {
                self.selection.set_full_range(signal.duration());
                let preview = waveform::reduce(&signal, self.bucket_count);
                if preview.is_silent() {
                    debug!("Waveform is silent");
                }
                info!(
                    duration_secs = signal.duration(),
                    sample_rate = signal.sample_rate(),
                    channels = signal.channel_count(),
                    "Waveform ready"
                );
                self.waveform = Some(preview);
                self.signal = Some(signal);
                self.state = PipelineState::WaveformReady;
                Ok(())
            }
            Err(err) => {
                warn!("Waveform unavailable: {err}");
                self.state = PipelineState::WaveformFailed;
                Err(err.into())
            }
        }
    }

    /// Feed a timeline pointer event; ignored without a decoded signal.
    pub fn handle_pointer(
        &mut self,
        event: PointerEvent,
        geometry: TimelineGeometry,
    ) -> Option<InteractionOutcome> {
        self.signal.as_ref()?;
        Some(self.interaction.handle(event, &mut self.selection, geometry))
    }

    /// Apply the start/end text fields.
    pub fn edit_selection_text(&mut self, start: &str, end: &str) -> TextEditOutcome {
        self.selection.apply_text_edit(start, end)
    }

    pub fn set_selection(&mut self, start: f64, end: f64) -> Selection {
        self.selection.set_range(start, end)
    }

    pub fn reset_selection(&mut self) {
        self.stop_playback();
        self.selection.reset();
    }

    /// Play the selected range, or stop it when it is already playing.
    pub fn play_selection(&mut self) -> Result<PlaybackState, PipelineError> {
        if self.audition.is_playing() {
            self.stop_playback();
            return Ok(PlaybackState::Stopped);
        }
        let signal = match (self.signal.as_ref(), self.source.as_ref()) {
            (Some(signal), _) => signal,
            (None, Some(_)) => return Err(PlaybackError::NoSignal.into()),
            (None, None) => return Err(PipelineError::NoFile),
        };
        let selection = self.selection.selection();
        let clip =
            AuditionClip::from_selection(signal, selection).ok_or(PlaybackError::EmptySelection)?;
        let length = clip.duration();
        self.audition.play(clip)?;
        info!(
            start_secs = selection.start(),
            end_secs = selection.end(),
            length_secs = length.as_secs_f64(),
            "Playing selection"
        );
        Ok(PlaybackState::Playing)
    }

    pub fn stop_playback(&mut self) {
        if self.audition.is_playing() {
            debug!("Playback stopped");
        }
        self.audition.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.audition.is_playing()
    }

    /// Encode the current selection.
    ///
    /// The session stays mutably borrowed until the encode finishes, so a
    /// second request cannot start while one is running.
    pub fn extract(
        &mut self,
        dispatcher: &mut EncodeDispatcher,
        capture_acknowledged: bool,
        sink: &mut dyn ProgressSink,
    ) -> Result<&EncodeResult, PipelineError> {
        let Some(source) = self.source.as_ref() else {
            return Err(PipelineError::NoFile);
        };
        self.result = None;
        let previous = self.state;
        self.state = PipelineState::Encoding;
        let mut request = EncodeRequest::new(&source.name, &source.bytes)
            .with_format(self.format, self.tier);
        if let Some(signal) = self.signal.as_ref() {
            request = request
                .with_signal(signal)
                .with_selection(self.selection.selection());
        }
        if capture_acknowledged {
            request = request.acknowledge_capture();
        }
        debug!(?previous, "Encoding");
        match dispatcher.dispatch(&request, sink, &self.cancel) {
            Ok(result) => {
                for warning in &result.warnings {
                    warn!("{warning}");
                }
                self.state = PipelineState::ResultReady;
                Ok(&*self.result.insert(result))
            }
            Err(err) => {
                self.state = PipelineState::Failed;
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{EngineInitError, EngineInitKind, RecordingError};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct OutputLog {
        clips: Vec<AuditionClip>,
        playing: bool,
        stops: usize,
        releases: usize,
    }

    #[derive(Clone, Default)]
    struct LoggedOutput(Arc<Mutex<OutputLog>>);

    impl LoggedOutput {
        fn log(&self) -> std::sync::MutexGuard<'_, OutputLog> {
            self.0.lock().unwrap()
        }
    }

    impl AuditionOutput for LoggedOutput {
        fn play(&mut self, clip: AuditionClip) -> Result<(), PlaybackError> {
            let mut log = self.log();
            log.clips.push(clip);
            log.playing = true;
            Ok(())
        }

        fn stop(&mut self) {
            let mut log = self.log();
            log.playing = false;
            log.stops += 1;
        }

        fn is_playing(&self) -> bool {
            self.log().playing
        }

        fn release(&mut self) {
            self.stop();
            self.log().releases += 1;
        }
    }

    fn session_with_output(output: &LoggedOutput) -> Session {
        let mut session = Session::default();
        session.set_audition_output(Box::new(output.clone()));
        session
    }

    fn wav_bytes(seconds: f32, rate: u32) -> Vec<u8> {
        let frames = (seconds * rate as f32) as usize;
        let samples: Vec<f32> = (0..frames).map(|i| ((i % 100) as f32 / 100.0) - 0.5).collect();
        crate::encode::encode_wav(&[&samples], rate).unwrap()
    }

    #[test]
    fn loading_builds_signal_selection_and_preview() {
        let mut session = Session::default();
        session.load_file("clip.wav", wav_bytes(2.0, 8_000)).unwrap();
        assert_eq!(session.state(), PipelineState::WaveformReady);
        let duration = session.signal().unwrap().duration();
        assert!((duration - 2.0).abs() < 1e-9);
        assert_eq!(session.selection(), Selection::full(duration));
        assert_eq!(session.waveform().unwrap().len(), DEFAULT_BUCKET_COUNT);
    }

    #[test]
    fn undecodable_file_stays_loaded_with_failed_waveform() {
        let mut session = Session::default();
        let err = session
            .load_file("movie.mp4", b"definitely not media".to_vec())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
        assert_eq!(session.state(), PipelineState::WaveformFailed);
        assert!(session.source().is_some());
        assert!(session.signal().is_none());
        assert!(session.can_extract());
    }

    #[test]
    fn reset_tears_everything_down_and_cancels() {
        let mut session = Session::default();
        session.load_file("clip.wav", wav_bytes(1.0, 8_000)).unwrap();
        let token = session.cancel_token();
        session.reset();
        assert!(token.is_cancelled());
        assert!(!session.cancel_token().is_cancelled());
        assert_eq!(session.state(), PipelineState::Idle);
        assert!(session.signal().is_none());
        assert!(session.waveform().is_none());
        assert!(session.source().is_none());
        assert!(!session.can_extract());
    }

    #[test]
    fn pointer_events_need_a_signal() {
        let mut session = Session::default();
        let geometry = TimelineGeometry::new(100.0);
        assert!(
            session
                .handle_pointer(PointerEvent::Move { x: 10.0 }, geometry)
                .is_none()
        );
        session.load_file("clip.wav", wav_bytes(1.0, 8_000)).unwrap();
        assert!(
            session
                .handle_pointer(PointerEvent::Move { x: 10.0 }, geometry)
                .is_some()
        );
    }

    #[test]
    fn malformed_text_leaves_selection_alone() {
        let mut session = Session::default();
        session.load_file("clip.wav", wav_bytes(3.0, 8_000)).unwrap();
        let before = session.selection();
        let outcome = session.edit_selection_text("12:xx", "00:00:02");
        assert!(!outcome.validity.start_valid);
        assert!(outcome.validity.end_valid);
        assert!(outcome.committed.is_none());
        assert_eq!(session.selection(), before);
    }

    #[test]
    fn play_selection_toggles_and_plays_only_the_range() {
        let output = LoggedOutput::default();
        let mut session = session_with_output(&output);
        session.load_file("clip.wav", wav_bytes(2.0, 8_000)).unwrap();
        session.set_selection(0.5, 1.0);
        assert_eq!(session.play_selection().unwrap(), PlaybackState::Playing);
        assert!(session.is_playing());
        {
            let log = output.log();
            assert_eq!(log.clips.len(), 1);
            assert_eq!(log.clips[0].frame_count(), 4_000);
            assert_eq!(log.clips[0].sample_rate, 8_000);
        }
        assert_eq!(session.play_selection().unwrap(), PlaybackState::Stopped);
        assert!(!session.is_playing());
        assert_eq!(output.log().clips.len(), 1);
    }

    #[test]
    fn loading_and_resetting_tear_down_playback() {
        let output = LoggedOutput::default();
        let mut session = session_with_output(&output);
        session.load_file("clip.wav", wav_bytes(1.0, 8_000)).unwrap();
        session.play_selection().unwrap();
        let releases = output.log().releases;
        session.load_file("next.wav", wav_bytes(1.0, 8_000)).unwrap();
        assert!(!session.is_playing());
        assert_eq!(output.log().releases, releases + 1);

        session.play_selection().unwrap();
        session.reset();
        assert!(!session.is_playing());
        assert_eq!(output.log().releases, releases + 2);
    }

    #[test]
    fn reset_selection_stops_playback() {
        let output = LoggedOutput::default();
        let mut session = session_with_output(&output);
        session.load_file("clip.wav", wav_bytes(1.0, 8_000)).unwrap();
        session.play_selection().unwrap();
        session.reset_selection();
        assert!(!session.is_playing());
    }

    #[test]
    fn playback_needs_a_decoded_signal() {
        let output = LoggedOutput::default();
        let mut session = session_with_output(&output);
        assert!(matches!(session.play_selection(), Err(PipelineError::NoFile)));
        let _ = session.load_file("movie.mp4", b"definitely not media".to_vec());
        let err = session.play_selection().unwrap_err();
        assert!(matches!(err, PipelineError::Playback(PlaybackError::NoSignal)));
        assert!(err.status_message().starts_with("Could not play the selection"));
        assert!(output.log().clips.is_empty());
    }

    #[test]
    fn status_messages_keep_raw_detail() {
        let init = PipelineError::Encode(EncodeError::EngineInit(EngineInitError::new(
            EngineInitKind::Network,
            "connection reset by peer",
        )));
        let text = init.status_message();
        assert!(text.contains("check the connection"));
        assert!(text.ends_with("connection reset by peer"));

        let recording = PipelineError::Encode(EncodeError::Recording(RecordingError::Recorder {
            message: "device lost".into(),
        }));
        let text = recording.status_message();
        assert!(text.starts_with("Recording capture failed"));
        assert!(text.contains("device lost"));

        assert_eq!(PipelineError::NoFile.status_message(), "Choose a file first");
    }
}
