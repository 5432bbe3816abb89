//! Symphonia-backed decoding of whole media files into a [`Signal`].

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::Signal;

/// Reasons a media file could not be turned into a signal.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The container or codec is not supported by the decoder.
    #[error("Unsupported media: {message}")]
    Unsupported { message: String },
    /// The container holds no decodable audio track.
    #[error("No decodable audio track found")]
    NoAudioTrack,
    /// The data is corrupt or ends prematurely.
    #[error("Audio data is corrupt or truncated: {message}")]
    Corrupt { message: String },
    /// Decoding succeeded but produced no audio frames.
    #[error("Decoded audio has zero duration")]
    Empty,
}

impl From<SymphoniaError> for DecodeError {
    fn from(error: SymphoniaError) -> Self {
        match error {
            SymphoniaError::Unsupported(message) => DecodeError::Unsupported {
                message: message.to_string(),
            },
            other => DecodeError::Corrupt {
                message: other.to_string(),
            },
        }
    }
}

/// Decode file bytes without a container hint.
pub fn decode(bytes: &[u8]) -> Result<Signal, DecodeError> {
    decode_with_hint(bytes, None)
}

/// Decode file bytes, using `extension` (e.g. `"mp4"`) to help the probe.
pub fn decode_with_hint(bytes: &[u8], extension: Option<&str>) -> Result<Signal, DecodeError> {
    let mut context = DecodeContext::open(bytes, extension)?;
    context.decode_all()
}

/// Format reader and codec for one decode call; released when dropped.
struct DecodeContext {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    /// Frame count declared by the container, when it states one.
    declared_frames: Option<u64>,
    /// Shortfall tolerated against `declared_frames` (one packet).
    frame_slack: u64,
}

impl DecodeContext {
    fn open(bytes: &[u8], extension: Option<&str>) -> Result<Self, DecodeError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }
        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let reader = probed.format;
        let track = reader
            .tracks()
            .iter()
            .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;
        let track_id = track.id;
        let declared_frames = track.codec_params.n_frames;
        let frame_slack = track
            .codec_params
            .max_frames_per_packet
            .unwrap_or(0);
        let decoder =
            symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;
        trace!(track_id, "decode context opened");
        Ok(Self {
            reader,
            decoder,
            track_id,
            declared_frames,
            frame_slack,
        })
    }

    fn decode_all(&mut self) -> Result<Signal, DecodeError> {
        let mut planar: Vec<Vec<f32>> = Vec::new();
        let mut sample_rate = 0u32;
        let mut skipped_packets = 0usize;

        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref error))
                    if error.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(error) => return Err(error.into()),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(message)) => {
                    skipped_packets += 1;
                    warn!("Skipping undecodable packet: {message}");
                    continue;
                }
                Err(SymphoniaError::IoError(ref error))
                    if error.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(error) => return Err(error.into()),
            };

            let spec = *decoded.spec();
            let channel_count = spec.channels.count().max(1);
            if planar.is_empty() {
                planar = vec![Vec::new(); channel_count];
                sample_rate = spec.rate;
            }
            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            for frame in buffer.samples().chunks(channel_count) {
                for (index, channel) in planar.iter_mut().enumerate() {
                    channel.push(frame.get(index).copied().unwrap_or(0.0));
                }
            }
        }

        let frames = planar.first().map(Vec::len).unwrap_or(0);
        if frames == 0 {
            return Err(DecodeError::Empty);
        }
        if let Some(declared) = self.declared_frames {
            if (frames as u64).saturating_add(self.frame_slack) < declared {
                return Err(DecodeError::Corrupt {
                    message: format!("stream ended after {frames} of {declared} frames"),
                });
            }
        }
        debug!(
            sample_rate,
            channels = planar.len(),
            frames,
            skipped_packets,
            "decoded signal"
        );
        Signal::new(sample_rate, planar).ok_or_else(|| DecodeError::Corrupt {
            message: format!("invalid stream parameters (sample rate {sample_rate})"),
        })
    }
}

impl Drop for DecodeContext {
    fn drop(&mut self) {
        trace!(track_id = self.track_id, "decode context released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(channels: u16, sample_rate: u32, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for frame in 0..frames {
                for channel in 0..channels {
                    let value = if channel == 0 { 8_000 } else { -8_000 };
                    writer
                        .write_sample(if frame % 2 == 0 { value } else { 0i16 })
                        .unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_stereo_wav_into_planar_channels() {
        let bytes = wav_bytes(2, 8_000, 800);
        let signal = decode_with_hint(&bytes, Some("wav")).unwrap();
        assert_eq!(signal.sample_rate(), 8_000);
        assert_eq!(signal.channel_count(), 2);
        assert_eq!(signal.frame_count(), 800);
        assert!((signal.duration() - 0.1).abs() < 1e-9);
        let left = signal.channel(0).unwrap();
        let right = signal.channel(1).unwrap();
        assert!(left[0] > 0.2);
        assert!(right[0] < -0.2);
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let error = decode(b"definitely not a media container").unwrap_err();
        assert!(matches!(
            error,
            DecodeError::Unsupported { .. } | DecodeError::Corrupt { .. }
        ));
    }

    #[test]
    fn header_only_wav_has_zero_duration() {
        let bytes = wav_bytes(1, 8_000, 0);
        let error = decode_with_hint(&bytes, Some("wav")).unwrap_err();
        assert!(matches!(error, DecodeError::Empty));
    }

    #[test]
    fn cut_off_wav_is_reported_as_truncated() {
        let bytes = wav_bytes(1, 8_000, 16_000);
        let cut = &bytes[..bytes.len() / 2];
        let error = decode_with_hint(cut, Some("wav")).unwrap_err();
        match error {
            DecodeError::Corrupt { message } => assert!(message.contains("of 16000 frames")),
            other => panic!("expected truncation, got {other:?}"),
        }
    }
}
