use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::capture::{
    self, CaptureBackend, CaptureRequest, CaptureSource, DEFAULT_RECORDING_TIMEOUT, FfmpegCapture,
    PlaybackGraph,
};
use super::engine::{FfmpegEngine, TranscodeEngine, TranscodeJob, TrimWindow};
use super::mp3::{LameBackend, Mp3Backend, encode_mp3};
use super::pcm::{FrameRange, slice_channels};
use super::probe::{CapabilityProbe, HostProfile, container_of};
use super::wav::encode_wav;
use super::{
    CancelToken, CooperativeYield, EncodeError, EncodeRequest, EncodeWarning, OutputFormat,
    QualityTier, RecordingError, StrategyKind, StrategyPreference, bitrate_for,
};
use crate::progress::{
    EncodePhase, EncodeResult, ProgressReporter, ProgressSink, suggested_filename,
};
use crate::selection::Selection;
use crate::signal::{Signal, decode_with_hint};

/// Tunables for the dispatcher.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchOptions {
    pub strategy: StrategyPreference,
    pub recording_timeout: Duration,
    /// MP3 blocks between cooperative yields.
    pub yield_every_blocks: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            strategy: StrategyPreference::Local,
            recording_timeout: DEFAULT_RECORDING_TIMEOUT,
            yield_every_blocks: 32,
        }
    }
}

/// Bytes produced by one strategy run, before validation.
struct StrategyOutput {
    bytes: Vec<u8>,
    format: OutputFormat,
    achieved_duration: f64,
    strategy: StrategyKind,
}

/// Chooses and runs an encode strategy for each request.
pub struct EncodeDispatcher {
    options: DispatchOptions,
    probe: Box<dyn CapabilityProbe>,
    engine: Box<dyn TranscodeEngine>,
    mp3: Box<dyn Mp3Backend>,
    capture: Box<dyn CaptureBackend>,
}

impl EncodeDispatcher {
    pub fn new(
        options: DispatchOptions,
        probe: Box<dyn CapabilityProbe>,
        engine: Box<dyn TranscodeEngine>,
        mp3: Box<dyn Mp3Backend>,
        capture: Box<dyn CaptureBackend>,
    ) -> Self {
        Self {
            options,
            probe,
            engine,
            mp3,
            capture,
        }
    }

    /// Dispatcher backed by LAME and an `ffmpeg` binary.
    pub fn native(options: DispatchOptions, host: HostProfile, ffmpeg: impl Into<PathBuf>) -> Self {
        let ffmpeg = ffmpeg.into();
        Self::new(
            options,
            Box::new(host),
            Box::new(FfmpegEngine::new(ffmpeg.clone())),
            Box::new(LameBackend),
            Box::new(FfmpegCapture::new(ffmpeg)),
        )
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub fn set_strategy(&mut self, strategy: StrategyPreference) {
        self.options.strategy = strategy;
    }

    /// Run one encode to completion.
    ///
    /// Unavailable AAC and FLAC encoders are retried once with MP3 and WAV
    /// respectively; every other failure is returned as-is after the
    /// invocation's temporary resources have been released.
    pub fn dispatch(
        &mut self,
        request: &EncodeRequest<'_>,
        sink: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<EncodeResult, EncodeError> {
        validate_selection(request)?;
        let mut progress = ProgressReporter::new(sink);
        let mut warnings = Vec::new();
        let container = container_of(request.source_name);
        let forced = container
            .as_deref()
            .is_some_and(|container| self.probe.requires_recording_capture(container));
        info!(
            source = request.source_name,
            format = %request.format,
            tier = %request.tier,
            forced_capture = forced,
            "Encode started"
        );
        let outcome = if forced {
            if !request.capture_acknowledged {
                return Err(EncodeError::AcknowledgmentRequired);
            }
            self.run_forced_capture(request, &mut progress, cancel, &mut warnings)
        } else {
            match self.options.strategy {
                StrategyPreference::External => self.run_external(request, &mut progress, cancel),
                StrategyPreference::Local => {
                    self.run_local(request, &mut progress, cancel, &mut warnings)
                }
            }
        };
        let output = outcome.inspect_err(|err| error!("Encode failed: {err}"))?;

        progress.report_fraction(EncodePhase::Validating, 0.0);
        if output.bytes.is_empty() {
            error!(format = %output.format, "Encoder produced no bytes");
            return Err(EncodeError::EmptyOutput);
        }
        let clipped = request.trim().is_some();
        let suggested_filename =
            suggested_filename(request.source_name, output.format, request.tier, clipped);
        progress.report(EncodePhase::Done, 100.0);
        info!(
            file = %suggested_filename,
            bytes = output.bytes.len(),
            duration_secs = output.achieved_duration,
            warnings = warnings.len(),
            "Encode finished"
        );
        Ok(EncodeResult {
            bytes: output.bytes,
            format: output.format,
            requested_format: request.format,
            tier: request.tier,
            suggested_filename,
            achieved_duration: output.achieved_duration,
            strategy: output.strategy,
            warnings,
        })
    }

    fn run_external(
        &mut self,
        request: &EncodeRequest<'_>,
        progress: &mut ProgressReporter<'_>,
        cancel: &CancelToken,
    ) -> Result<StrategyOutput, EncodeError> {
        progress.report(EncodePhase::Preparing, 10.0);
        self.engine.initialize()?;
        progress.report(EncodePhase::Preparing, 20.0);
        let trim = request.trim().map(|selection| TrimWindow {
            start: selection.start(),
            duration: selection.span(),
        });
        let expected_duration = trim
            .map(|trim| trim.duration)
            .or_else(|| request.signal.map(Signal::duration))
            .unwrap_or(0.0);
        let job = TranscodeJob {
            input: request.source_bytes,
            input_name: request.source_name,
            trim,
            format: request.format,
            bitrate_kbps: bitrate_for(request.format, request.tier),
            expected_duration,
        };
        progress.report(EncodePhase::Encoding, 40.0);
        let bytes = self.engine.transcode(
            &job,
            &mut |percent: f32| progress.report(EncodePhase::Encoding, percent),
            cancel,
        )?;
        progress.report(EncodePhase::Validating, 80.0);
        let achieved_duration = match decode_with_hint(&bytes, Some(request.format.extension())) {
            Ok(decoded) => decoded.duration(),
            Err(err) => {
                debug!("Could not measure engine output: {err}");
                expected_duration
            }
        };
        Ok(StrategyOutput {
            bytes,
            format: request.format,
            achieved_duration,
            strategy: StrategyKind::ExternalTranscode,
        })
    }

    fn run_local(
        &mut self,
        request: &EncodeRequest<'_>,
        progress: &mut ProgressReporter<'_>,
        cancel: &CancelToken,
        warnings: &mut Vec<EncodeWarning>,
    ) -> Result<StrategyOutput, EncodeError> {
        let decoded;
        let signal = match request.signal {
            Some(signal) => signal,
            None => {
                progress.report_fraction(EncodePhase::Decoding, 0.0);
                let hint = container_of(request.source_name);
                decoded = decode_with_hint(request.source_bytes, hint.as_deref())?;
                &decoded
            }
        };
        progress.report_fraction(EncodePhase::Decoding, 1.0);
        let range = FrameRange::for_selection(signal, request.selection);
        if range.is_empty() {
            let selection = request
                .selection
                .unwrap_or_else(|| Selection::full(signal.duration()));
            return Err(EncodeError::InvalidSelection {
                start: selection.start(),
                end: selection.end(),
            });
        }
        let channels = slice_channels(signal, range);
        progress.report_fraction(EncodePhase::Trimming, 1.0);
        debug!(
            start_frame = range.start,
            end_frame = range.end,
            channels = channels.len(),
            "Selected sample range"
        );

        let first = self.encode_samples(
            request.format,
            request.tier,
            &channels,
            signal.sample_rate(),
            progress,
            cancel,
            warnings,
        );
        match first {
            Err(EncodeError::EncoderUnavailable { format, reason }) => {
                let Some(substitute) = substitute_for(format) else {
                    return Err(EncodeError::EncoderUnavailable { format, reason });
                };
                warn!(
                    requested = %format,
                    delivered = %substitute,
                    "{reason}; substituting"
                );
                warnings.push(EncodeWarning::Substituted {
                    requested: format,
                    delivered: substitute,
                    reason,
                });
                progress.restart();
                progress.report_fraction(EncodePhase::Trimming, 1.0);
                self.encode_samples(
                    substitute,
                    request.tier,
                    &channels,
                    signal.sample_rate(),
                    progress,
                    cancel,
                    warnings,
                )
            }
            other => other,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_samples(
        &mut self,
        format: OutputFormat,
        tier: QualityTier,
        channels: &[&[f32]],
        sample_rate: u32,
        progress: &mut ProgressReporter<'_>,
        cancel: &CancelToken,
        warnings: &mut Vec<EncodeWarning>,
    ) -> Result<StrategyOutput, EncodeError> {
        let frames = channels.first().map(|channel| channel.len()).unwrap_or(0);
        let achieved_duration = frames as f64 / sample_rate.max(1) as f64;
        let mut pacer = CooperativeYield::new(self.options.yield_every_blocks, cancel.clone());
        let (bytes, strategy) = match format {
            OutputFormat::Mp3 => {
                if !self.probe.can_directly_encode(OutputFormat::Mp3) {
                    return Err(EncodeError::EncoderUnavailable {
                        format,
                        reason: "no MP3 encoder in this environment".into(),
                    });
                }
                let bytes = encode_mp3(
                    channels,
                    sample_rate,
                    tier.bitrate_kbps(),
                    self.mp3.as_ref(),
                    &mut pacer,
                    progress,
                )?;
                (bytes, StrategyKind::DirectEncode)
            }
            OutputFormat::Wav => {
                if !self.probe.can_directly_encode(OutputFormat::Wav) {
                    return Err(EncodeError::EncoderUnavailable {
                        format,
                        reason: "WAV output is disabled for this host".into(),
                    });
                }
                let bytes = encode_wav(channels, sample_rate)
                    .map_err(|err| EncodeError::encoder(format, err))?;
                progress.report_fraction(EncodePhase::Encoding, 1.0);
                (bytes, StrategyKind::DirectEncode)
            }
            OutputFormat::Flac => {
                return Err(EncodeError::EncoderUnavailable {
                    format,
                    reason: "no FLAC encoder in this environment".into(),
                });
            }
            OutputFormat::Aac => {
                let Some(signature) = capture::negotiate(self.capture.as_ref(), format) else {
                    return Err(EncodeError::EncoderUnavailable {
                        format,
                        reason: "no AAC-capable recording format".into(),
                    });
                };
                let mut graph = PlaybackGraph::new();
                let rendered = graph.render(channels, sample_rate)?.to_path_buf();
                let capture_request = CaptureRequest {
                    source: CaptureSource::Rendered(&rendered),
                    signature,
                    bitrate_kbps: tier.bitrate_kbps(),
                    expected_duration: achieved_duration,
                };
                let outcome = capture::record(
                    self.capture.as_ref(),
                    &mut graph,
                    &capture_request,
                    self.options.recording_timeout,
                    &mut pacer,
                    progress,
                )?;
                if outcome.timed_out {
                    warnings.push(EncodeWarning::RecordingTimedOut {
                        after_secs: self.options.recording_timeout.as_secs(),
                    });
                }
                (outcome.bytes, StrategyKind::RecordingCapture)
            }
        };
        Ok(StrategyOutput {
            bytes,
            format,
            achieved_duration,
            strategy,
        })
    }

    fn run_forced_capture(
        &mut self,
        request: &EncodeRequest<'_>,
        progress: &mut ProgressReporter<'_>,
        cancel: &CancelToken,
        warnings: &mut Vec<EncodeWarning>,
    ) -> Result<StrategyOutput, EncodeError> {
        let signature = match capture::negotiate(self.capture.as_ref(), request.format) {
            Some(signature) => signature,
            None => {
                let Some(signature) = self.capture.signatures().into_iter().next() else {
                    return Err(RecordingError::NoSignature.into());
                };
                warn!(
                    requested = %request.format,
                    delivered = %signature.format,
                    "Recording capture cannot produce the requested format"
                );
                warnings.push(EncodeWarning::Substituted {
                    requested: request.format,
                    delivered: signature.format,
                    reason: "recording capture supports a different format".into(),
                });
                signature
            }
        };
        progress.report(EncodePhase::Preparing, 0.0);
        let extension = container_of(request.source_name).unwrap_or_default();
        let mut graph = PlaybackGraph::new();
        let staged = graph.stage(request.source_bytes, &extension)?.to_path_buf();
        let trim = request.trim();
        let expected_duration = trim
            .map(|selection| selection.span())
            .or_else(|| request.signal.map(Signal::duration))
            .unwrap_or(0.0);
        let capture_request = CaptureRequest {
            source: CaptureSource::Original {
                path: &staged,
                start: trim.map_or(0.0, |selection| selection.start()),
                duration: trim.map(|selection| selection.span()),
            },
            signature,
            bitrate_kbps: bitrate_for(signature.format, request.tier)
                .unwrap_or_else(|| request.tier.bitrate_kbps()),
            expected_duration,
        };
        let mut pacer = CooperativeYield::new(self.options.yield_every_blocks, cancel.clone());
        let outcome = capture::record(
            self.capture.as_ref(),
            &mut graph,
            &capture_request,
            self.options.recording_timeout,
            &mut pacer,
            progress,
        )?;
        let mut achieved_duration = expected_duration;
        if outcome.timed_out {
            let limit = self.options.recording_timeout.as_secs();
            warnings.push(EncodeWarning::RecordingTimedOut { after_secs: limit });
            achieved_duration = achieved_duration.min(limit as f64);
        }
        Ok(StrategyOutput {
            bytes: outcome.bytes,
            format: signature.format,
            achieved_duration,
            strategy: StrategyKind::RecordingCapture,
        })
    }
}

/// Documented substitute when `format` has no encoder.
fn substitute_for(format: OutputFormat) -> Option<OutputFormat> {
    match format {
        OutputFormat::Aac => Some(OutputFormat::Mp3),
        OutputFormat::Flac => Some(OutputFormat::Wav),
        OutputFormat::Mp3 | OutputFormat::Wav => None,
    }
}

fn validate_selection(request: &EncodeRequest<'_>) -> Result<(), EncodeError> {
    let Some(selection) = request.selection else {
        return Ok(());
    };
    let (start, end) = (selection.start(), selection.end());
    let in_signal = request
        .signal
        .is_none_or(|signal| start < signal.duration());
    if start.is_finite() && end.is_finite() && start >= 0.0 && end > start && in_signal {
        Ok(())
    } else {
        Err(EncodeError::InvalidSelection { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_only_aac_and_flac() {
        assert_eq!(substitute_for(OutputFormat::Aac), Some(OutputFormat::Mp3));
        assert_eq!(substitute_for(OutputFormat::Flac), Some(OutputFormat::Wav));
        assert_eq!(substitute_for(OutputFormat::Mp3), None);
        assert_eq!(substitute_for(OutputFormat::Wav), None);
    }
}
