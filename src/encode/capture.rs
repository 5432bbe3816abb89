//! Record-through-playback encoding.
//!
//! The selected range is played in real time through a recorder that emits a
//! compressed stream. Wall-clock cost equals the playback duration, bounded
//! by a hard timeout.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::cancel::CooperativeYield;
use super::engine::{parse_progress_time, push_tail_line, seconds_arg};
use super::error::RecordingError;
use super::wav::encode_wav;
use super::{EncodeError, OutputFormat};
use crate::progress::{EncodePhase, ProgressReporter};

/// Default upper bound on one recording.
pub const DEFAULT_RECORDING_TIMEOUT: Duration = Duration::from_secs(600);

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const READ_CHUNK_BYTES: usize = 16 * 1024;

/// Output format a capture backend can emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureSignature {
    pub format: OutputFormat,
    pub mime_type: &'static str,
}

impl CaptureSignature {
    pub const AAC_ADTS: CaptureSignature = CaptureSignature {
        format: OutputFormat::Aac,
        mime_type: "audio/aac",
    };
}

/// What gets played into the recorder.
#[derive(Clone, Copy, Debug)]
pub enum CaptureSource<'a> {
    /// A rendered WAV holding exactly the selected range.
    Rendered(&'a Path),
    /// The original file, played from `start` for `duration` seconds.
    Original {
        path: &'a Path,
        start: f64,
        duration: Option<f64>,
    },
}

/// Parameters for one recording.
#[derive(Clone, Copy, Debug)]
pub struct CaptureRequest<'a> {
    pub source: CaptureSource<'a>,
    pub signature: CaptureSignature,
    pub bitrate_kbps: u32,
    /// Playback length in seconds, for progress.
    pub expected_duration: f64,
}

/// Notification from a running capture.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureEvent {
    /// Encoded bytes, in stream order.
    Chunk(Vec<u8>),
    /// Playback position in seconds.
    Position(f64),
    /// Playback ended and every chunk has been delivered.
    Finished,
    Failed(String),
}

/// A running playback + recorder pair.
pub trait CaptureSession {
    /// Next event, waiting at most `wait`; `None` when nothing arrived.
    fn next_event(&mut self, wait: Duration) -> Option<CaptureEvent>;
    /// Stop playback and recording. Safe to call more than once.
    fn stop(&mut self);
}

/// Platform record API.
pub trait CaptureBackend {
    /// Output signatures this environment can record to.
    fn signatures(&self) -> Vec<CaptureSignature>;
    fn start(
        &self,
        request: &CaptureRequest<'_>,
    ) -> Result<Box<dyn CaptureSession>, RecordingError>;
}

/// First signature recording `format`, if any.
pub fn negotiate(
    backend: &dyn CaptureBackend,
    format: OutputFormat,
) -> Option<CaptureSignature> {
    backend
        .signatures()
        .into_iter()
        .find(|signature| signature.format == format)
}

/// Temporary playback resources for one recording.
///
/// Dropping the graph stops the session and deletes the rendered file, on
/// success and on every error path.
pub struct PlaybackGraph {
    rendered: Option<NamedTempFile>,
    session: Option<Box<dyn CaptureSession>>,
}

impl PlaybackGraph {
    pub fn new() -> Self {
        Self {
            rendered: None,
            session: None,
        }
    }

    /// Render the selected range to a temporary WAV and keep it alive.
    pub fn render(
        &mut self,
        channels: &[&[f32]],
        sample_rate: u32,
    ) -> Result<&Path, RecordingError> {
        let bytes = encode_wav(channels, sample_rate)
            .map_err(|message| RecordingError::Graph { message })?;
        self.stage(&bytes, "wav")
    }

    /// Keep `bytes` in a temporary file with `extension` for playback.
    pub fn stage(&mut self, bytes: &[u8], extension: &str) -> Result<&Path, RecordingError> {
        let suffix = if extension.is_empty() {
            String::new()
        } else {
            format!(".{extension}")
        };
        let mut file = tempfile::Builder::new()
            .prefix("snipwave-capture-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|err| RecordingError::Graph {
                message: format!("Failed to create playback file: {err}"),
            })?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|err| RecordingError::Graph {
                message: format!("Failed to write playback file: {err}"),
            })?;
        debug!(
            path = %file.path().display(),
            bytes = bytes.len(),
            "Staged playback source"
        );
        Ok(self.rendered.insert(file).path())
    }

    fn attach(&mut self, session: Box<dyn CaptureSession>) -> &mut dyn CaptureSession {
        &mut **self.session.insert(session)
    }
}

impl Default for PlaybackGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackGraph {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
        if let Some(file) = self.rendered.take() {
            if let Err(err) = file.close() {
                warn!("Failed to remove playback file: {err}");
            }
        }
        debug!("Playback graph torn down");
    }
}

/// Bytes captured by one recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub bytes: Vec<u8>,
    /// The recording was stopped by the timeout rather than by playback end.
    pub timed_out: bool,
}

/// Run one capture to completion, the timeout, or cancellation.
///
/// Reaching `timeout` stops the recording and keeps what was captured.
pub fn record(
    backend: &dyn CaptureBackend,
    graph: &mut PlaybackGraph,
    request: &CaptureRequest<'_>,
    timeout: Duration,
    pacer: &mut CooperativeYield,
    progress: &mut ProgressReporter<'_>,
) -> Result<CaptureOutcome, EncodeError> {
    pacer.check()?;
    let session = graph.attach(backend.start(request)?);
    info!(
        mime = request.signature.mime_type,
        expected_secs = request.expected_duration,
        "Recording started"
    );
    let started = Instant::now();
    let mut bytes = Vec::new();
    let mut timed_out = false;
    loop {
        if let Err(err) = pacer.check() {
            session.stop();
            return Err(err);
        }
        if started.elapsed() >= timeout {
            warn!(
                timeout_secs = timeout.as_secs(),
                "Recording timed out; stopping capture"
            );
            session.stop();
            drain(session, &mut bytes);
            timed_out = true;
            break;
        }
        match session.next_event(POLL_INTERVAL) {
            Some(CaptureEvent::Chunk(chunk)) => bytes.extend_from_slice(&chunk),
            Some(CaptureEvent::Position(seconds)) => {
                if request.expected_duration > 0.0 {
                    progress.report_fraction(
                        EncodePhase::Recording,
                        (seconds / request.expected_duration) as f32,
                    );
                }
            }
            Some(CaptureEvent::Finished) => break,
            Some(CaptureEvent::Failed(message)) => {
                session.stop();
                return Err(RecordingError::Recorder { message }.into());
            }
            None => {}
        }
    }
    progress.report_fraction(EncodePhase::Recording, 1.0);
    info!(
        bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Recording finished"
    );
    Ok(CaptureOutcome { bytes, timed_out })
}

fn drain(session: &mut dyn CaptureSession, bytes: &mut Vec<u8>) {
    while let Some(event) = session.next_event(Duration::ZERO) {
        match event {
            CaptureEvent::Chunk(chunk) => bytes.extend_from_slice(&chunk),
            CaptureEvent::Finished | CaptureEvent::Failed(_) => break,
            CaptureEvent::Position(_) => {}
        }
    }
}

/// Real-time capture through an `ffmpeg -re` pipe.
pub struct FfmpegCapture {
    binary: PathBuf,
    signatures: OnceLock<Vec<CaptureSignature>>,
}

impl FfmpegCapture {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            signatures: OnceLock::new(),
        }
    }

    fn probe_signatures(&self) -> Vec<CaptureSignature> {
        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();
        match output {
            Ok(output) if output.status.success() => {
                let listing = String::from_utf8_lossy(&output.stdout);
                if has_encoder(&listing, "aac") {
                    vec![CaptureSignature::AAC_ADTS]
                } else {
                    Vec::new()
                }
            }
            Ok(output) => {
                debug!(status = %output.status, "Encoder listing failed");
                Vec::new()
            }
            Err(err) => {
                debug!("Capture binary unavailable: {err}");
                Vec::new()
            }
        }
    }
}

/// True when an `ffmpeg -encoders` listing names `encoder`.
pub(crate) fn has_encoder(listing: &str, encoder: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|name| name == encoder)
}

impl CaptureBackend for FfmpegCapture {
    fn signatures(&self) -> Vec<CaptureSignature> {
        self.signatures
            .get_or_init(|| self.probe_signatures())
            .clone()
    }

    fn start(
        &self,
        request: &CaptureRequest<'_>,
    ) -> Result<Box<dyn CaptureSession>, RecordingError> {
        if request.signature.format != OutputFormat::Aac {
            return Err(RecordingError::NoSignature);
        }
        let mut command = Command::new(&self.binary);
        command.args(["-hide_banner", "-nostdin", "-loglevel", "error", "-re"]);
        match request.source {
            CaptureSource::Rendered(path) => {
                command.arg("-i").arg(path);
            }
            CaptureSource::Original {
                path,
                start,
                duration,
            } => {
                if start > 0.0 {
                    command.arg("-ss").arg(seconds_arg(start));
                }
                if let Some(duration) = duration {
                    command.arg("-t").arg(seconds_arg(duration));
                }
                command.arg("-i").arg(path);
            }
        }
        command
            .args(["-vn", "-c:a", "aac", "-b:a"])
            .arg(format!("{}k", request.bitrate_kbps))
            .args(["-f", "adts", "-progress", "pipe:2", "-nostats", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = command.spawn().map_err(|err| RecordingError::Recorder {
            message: format!("Failed to start recorder: {err}"),
        })?;
        let (sender, receiver) = mpsc::channel();
        let stdout = child.stdout.take().ok_or_else(|| RecordingError::Recorder {
            message: "Recorder output was not captured".into(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| RecordingError::Recorder {
            message: "Recorder diagnostics were not captured".into(),
        })?;
        let chunk_sender = sender.clone();
        let reader = thread::spawn(move || {
            let mut stdout = stdout;
            let mut buffer = vec![0_u8; READ_CHUNK_BYTES];
            loop {
                match stdout.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(read) => {
                        if chunk_sender
                            .send(RawEvent::Chunk(buffer[..read].to_vec()))
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(err) => {
                        let _ = chunk_sender.send(RawEvent::ReadFailed(err.to_string()));
                        break;
                    }
                }
            }
            let _ = chunk_sender.send(RawEvent::Eof);
        });
        let diagnostics = spawn_progress_reader(stderr, sender);
        Ok(Box::new(FfmpegCaptureSession {
            child: Some(child),
            receiver,
            reader: Some(reader),
            diagnostics: Some(diagnostics),
            done: false,
        }))
    }
}

enum RawEvent {
    Chunk(Vec<u8>),
    Position(f64),
    ReadFailed(String),
    Eof,
}

/// Forward `-progress` positions; other lines are kept for error messages.
fn spawn_progress_reader<R>(stderr: R, sender: mpsc::Sender<RawEvent>) -> JoinHandle<String>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut tail = Vec::new();
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            if let Some(seconds) = parse_progress_time(&line) {
                let _ = sender.send(RawEvent::Position(seconds));
            } else if !is_progress_key(&line) {
                push_tail_line(&mut tail, line);
            }
        }
        tail.join("\n")
    })
}

fn is_progress_key(line: &str) -> bool {
    line.split_once('=').is_some_and(|(key, _)| {
        !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

struct FfmpegCaptureSession {
    child: Option<Child>,
    receiver: Receiver<RawEvent>,
    reader: Option<JoinHandle<()>>,
    diagnostics: Option<JoinHandle<String>>,
    done: bool,
}

impl FfmpegCaptureSession {
    fn finish(&mut self) -> CaptureEvent {
        self.done = true;
        let status = self.child.take().map(|mut child| child.wait());
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        let diagnostics = self
            .diagnostics
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        match status {
            Some(Ok(status)) if status.success() => CaptureEvent::Finished,
            Some(Ok(status)) => CaptureEvent::Failed(format!(
                "recorder exited with {status}: {}",
                diagnostics.trim()
            )),
            Some(Err(err)) => CaptureEvent::Failed(format!("failed to wait for recorder: {err}")),
            None => CaptureEvent::Finished,
        }
    }
}

impl CaptureSession for FfmpegCaptureSession {
    fn next_event(&mut self, wait: Duration) -> Option<CaptureEvent> {
        if self.done {
            return None;
        }
        match self.receiver.recv_timeout(wait) {
            Ok(RawEvent::Chunk(chunk)) => Some(CaptureEvent::Chunk(chunk)),
            Ok(RawEvent::Position(seconds)) => Some(CaptureEvent::Position(seconds)),
            Ok(RawEvent::ReadFailed(message)) => {
                self.stop();
                Some(CaptureEvent::Failed(message))
            }
            Ok(RawEvent::Eof) | Err(RecvTimeoutError::Disconnected) => Some(self.finish()),
            Err(RecvTimeoutError::Timeout) => None,
        }
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            debug!("Recorder stopped");
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        if let Some(diagnostics) = self.diagnostics.take() {
            let _ = diagnostics.join();
        }
    }
}

impl Drop for FfmpegCaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
