//! Single-pass transcoding through an external `ffmpeg` process.

use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::error::{EngineInitError, EngineInitKind};
use super::{EncodeError, OutputFormat};

/// Output sample rate forced for mp3 and wav jobs.
const ENGINE_SAMPLE_RATE: &str = "44100";
const STDERR_TAIL_LINES: usize = 8;

/// Trim window in seconds, relative to the start of the input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrimWindow {
    pub start: f64,
    pub duration: f64,
}

/// One demux + trim + encode job.
#[derive(Clone, Copy, Debug)]
pub struct TranscodeJob<'a> {
    pub input: &'a [u8],
    /// Original file name; its extension is kept for container probing.
    pub input_name: &'a str,
    pub trim: Option<TrimWindow>,
    pub format: OutputFormat,
    pub bitrate_kbps: Option<u32>,
    /// Expected output duration, used to turn engine timestamps into a
    /// percentage. Zero disables engine progress.
    pub expected_duration: f64,
}

/// External engine performing a whole job in one step.
pub trait TranscodeEngine {
    /// Load the engine. Failures are fatal for the invocation.
    fn initialize(&mut self) -> Result<(), EngineInitError>;

    /// Run `job`, reporting engine progress as a percentage in `[0, 100]`.
    fn transcode(
        &mut self,
        job: &TranscodeJob<'_>,
        on_progress: &mut dyn FnMut(f32),
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, EncodeError>;
}

/// `ffmpeg` executable driven as a subprocess.
#[derive(Clone, Debug)]
pub struct FfmpegEngine {
    binary: PathBuf,
    ready: bool,
}

impl FfmpegEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ready: false,
        }
    }
}

impl TranscodeEngine for FfmpegEngine {
    fn initialize(&mut self) -> Result<(), EngineInitError> {
        if self.ready {
            return Ok(());
        }
        probe_binary(&self.binary)?;
        info!(binary = %self.binary.display(), "Transcoding engine ready");
        self.ready = true;
        Ok(())
    }

    fn transcode(
        &mut self,
        job: &TranscodeJob<'_>,
        on_progress: &mut dyn FnMut(f32),
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, EncodeError> {
        self.initialize()?;
        let workdir = tempfile::Builder::new()
            .prefix("snipwave-engine-")
            .tempdir()
            .map_err(|err| engine_failure(format!("Failed to create work dir: {err}")))?;
        let input_path = workdir.path().join(input_file_name(job.input_name));
        let output_path = workdir
            .path()
            .join(format!("output.{}", job.format.extension()));
        std::fs::write(&input_path, job.input)
            .map_err(|err| engine_failure(format!("Failed to stage input: {err}")))?;
        let args = build_args(job, &input_path, &output_path);
        debug!(?args, "Running transcoding engine");
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                EncodeError::EngineInit(EngineInitError::new(
                    EngineInitKind::from_io(&err),
                    format!("Failed to launch {}: {err}", self.binary.display()),
                ))
            })?;
        let stderr_reader = child.stderr.take().map(spawn_stderr_tail);
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if cancel.is_cancelled() {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(EncodeError::Cancelled);
                }
                if job.expected_duration <= 0.0 {
                    continue;
                }
                if let Some(seconds) = parse_progress_time(&line) {
                    let percent = (seconds / job.expected_duration * 100.0).clamp(0.0, 100.0);
                    on_progress(percent as f32);
                }
            }
        }
        let status = child
            .wait()
            .map_err(|err| engine_failure(format!("Failed to wait for engine: {err}")))?;
        let stderr_tail = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(engine_failure(format!(
                "ffmpeg exited with {status}: {}",
                stderr_tail.trim()
            )));
        }
        on_progress(100.0);
        std::fs::read(&output_path)
            .map_err(|err| engine_failure(format!("Failed to read engine output: {err}")))
    }
}

fn engine_failure(message: String) -> EncodeError {
    EncodeError::Engine { message }
}

/// Run `<binary> -version`, categorizing failures.
pub(crate) fn probe_binary(binary: &Path) -> Result<(), EngineInitError> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|err| {
            EngineInitError::new(
                EngineInitKind::from_io(&err),
                format!("Failed to launch {}: {err}", binary.display()),
            )
        })?;
    if output.status.success() {
        Ok(())
    } else {
        Err(EngineInitError::from_message(format!(
            "{} -version exited with {}: {}",
            binary.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Keep the last few stderr lines of a child for error messages.
pub(crate) fn spawn_stderr_tail<R>(stderr: R) -> thread::JoinHandle<String>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut tail: Vec<String> = Vec::new();
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            push_tail_line(&mut tail, line);
        }
        tail.join("\n")
    })
}

/// Append `line`, keeping only the most recent few.
pub(crate) fn push_tail_line(tail: &mut Vec<String>, line: String) {
    if tail.len() == STDERR_TAIL_LINES {
        tail.remove(0);
    }
    tail.push(line);
}

fn input_file_name(original: &str) -> String {
    match Path::new(original).extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => format!("input.{ext}"),
        _ => "input".to_string(),
    }
}

/// Seconds rendered the way the engine expects them.
pub(crate) fn seconds_arg(seconds: f64) -> String {
    format!("{:.3}", seconds.max(0.0))
}

/// Engine arguments for `job`, reading `input` and writing `output`.
pub fn build_args(job: &TranscodeJob<'_>, input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-loglevel", "error"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push("-i".into());
    args.push(input.as_os_str().to_owned());
    args.push("-vn".into());
    if let Some(trim) = job.trim {
        args.push("-ss".into());
        args.push(seconds_arg(trim.start).into());
        args.push("-t".into());
        args.push(seconds_arg(trim.duration).into());
    }
    let bitrate = job
        .bitrate_kbps
        .map(|kbps| format!("{kbps}k"))
        .unwrap_or_else(|| "128k".to_string());
    match job.format {
        OutputFormat::Mp3 => {
            args.extend(["-ar", ENGINE_SAMPLE_RATE, "-b:a"].map(OsString::from));
            args.push(bitrate.into());
        }
        OutputFormat::Aac => {
            args.extend(["-c:a", "aac", "-b:a"].map(OsString::from));
            args.push(bitrate.into());
        }
        OutputFormat::Wav => {
            args.extend(["-ar", ENGINE_SAMPLE_RATE].map(OsString::from));
        }
        OutputFormat::Flac => {
            args.extend(["-c:a", "flac"].map(OsString::from));
        }
    }
    args.extend(["-progress", "pipe:1", "-nostats"].map(OsString::from));
    args.push(output.as_os_str().to_owned());
    args
}

/// Output timestamp in seconds from an `ffmpeg -progress` line.
pub fn parse_progress_time(line: &str) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    let micros = match key {
        "out_time_ms" | "out_time_us" => value.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !micros.is_finite() || micros < 0.0 {
        warn!(line, "Ignoring malformed engine progress");
        return None;
    }
    Some(micros / 1_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(format: OutputFormat, trim: Option<TrimWindow>) -> TranscodeJob<'static> {
        TranscodeJob {
            input: b"",
            input_name: "movie.mov",
            trim,
            format,
            bitrate_kbps: crate::encode::bitrate_for(format, crate::encode::QualityTier::High),
            expected_duration: 10.0,
        }
    }

    fn rendered(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn mp3_job_carries_trim_and_bitrate() {
        let trim = TrimWindow {
            start: 2.0,
            duration: 3.5,
        };
        let args = rendered(&build_args(
            &job(OutputFormat::Mp3, Some(trim)),
            Path::new("in.mov"),
            Path::new("out.mp3"),
        ));
        let joined = args.join(" ");
        assert!(joined.contains("-i in.mov -vn -ss 2.000 -t 3.500 -ar 44100 -b:a 192k"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp3"));
    }

    #[test]
    fn full_range_job_has_no_trim_window() {
        let args = rendered(&build_args(
            &job(OutputFormat::Flac, None),
            Path::new("in.mov"),
            Path::new("out.flac"),
        ));
        assert!(!args.iter().any(|arg| arg == "-ss"));
        assert!(args.join(" ").contains("-c:a flac"));
        assert!(!args.iter().any(|arg| arg == "-b:a"));
    }

    #[test]
    fn aac_job_selects_codec() {
        let args = rendered(&build_args(
            &job(OutputFormat::Aac, None),
            Path::new("in.mov"),
            Path::new("out.aac"),
        ));
        assert!(args.join(" ").contains("-c:a aac -b:a 192k"));
    }

    #[test]
    fn parses_progress_lines() {
        assert_eq!(parse_progress_time("out_time_ms=2500000"), Some(2.5));
        assert_eq!(parse_progress_time("out_time_us=1000000"), Some(1.0));
        assert_eq!(parse_progress_time("out_time_ms=N/A"), None);
        assert_eq!(parse_progress_time("progress=continue"), None);
    }

    #[test]
    fn missing_binary_is_categorized_not_found() {
        let mut engine = FfmpegEngine::new("/nonexistent/snipwave-ffmpeg");
        let err = engine.initialize().unwrap_err();
        assert_eq!(err.kind, EngineInitKind::NotFound);
    }

    #[test]
    fn input_name_keeps_extension() {
        assert_eq!(input_file_name("clip.MOV"), "input.MOV");
        assert_eq!(input_file_name("clip"), "input");
    }
}
