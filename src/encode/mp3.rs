use mp3lame_encoder::{Bitrate, Builder, DualPcm, FlushNoGap, MonoPcm, Quality};
use tracing::debug;

use super::cancel::CooperativeYield;
use super::pcm::to_i16;
use super::{EncodeError, OutputFormat};
use crate::progress::{EncodePhase, ProgressReporter};

/// Frames fed to the streaming encoder per call.
pub const FRAMES_PER_BLOCK: usize = 1152;

const FLUSH_RESERVE_BYTES: usize = 7200;

/// Stream parameters for opening an encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mp3StreamConfig {
    pub channels: u8,
    pub sample_rate: u32,
    pub bitrate_kbps: u32,
}

/// A stateful encoder fed 16-bit planar blocks in order.
pub trait StreamingEncoder {
    /// Encode one block; `block` holds one slice per channel, all equal length.
    fn encode_block(&mut self, block: &[&[i16]], out: &mut Vec<u8>) -> Result<(), String>;
    /// Drain buffered frames after the last block.
    fn flush(&mut self, out: &mut Vec<u8>) -> Result<(), String>;
}

/// Factory for streaming MP3 encoders.
pub trait Mp3Backend {
    fn open(&self, config: Mp3StreamConfig) -> Result<Box<dyn StreamingEncoder>, EncodeError>;
}

/// LAME-backed MP3 encoding.
#[derive(Clone, Copy, Debug, Default)]
pub struct LameBackend;

impl Mp3Backend for LameBackend {
    fn open(&self, config: Mp3StreamConfig) -> Result<Box<dyn StreamingEncoder>, EncodeError> {
        let mut builder = Builder::new().ok_or_else(|| EncodeError::EncoderUnavailable {
            format: OutputFormat::Mp3,
            reason: "LAME could not allocate an encoder".into(),
        })?;
        builder
            .set_num_channels(config.channels)
            .map_err(|err| EncodeError::encoder(OutputFormat::Mp3, format!("channels: {err:?}")))?;
        builder
            .set_sample_rate(config.sample_rate)
            .map_err(|err| {
                EncodeError::encoder(OutputFormat::Mp3, format!("sample rate: {err:?}"))
            })?;
        builder
            .set_brate(lame_bitrate(config.bitrate_kbps))
            .map_err(|err| EncodeError::encoder(OutputFormat::Mp3, format!("bitrate: {err:?}")))?;
        builder
            .set_quality(Quality::Best)
            .map_err(|err| EncodeError::encoder(OutputFormat::Mp3, format!("quality: {err:?}")))?;
        let encoder = builder
            .build()
            .map_err(|err| EncodeError::encoder(OutputFormat::Mp3, format!("build: {err:?}")))?;
        Ok(Box::new(LameStream { encoder }))
    }
}

fn lame_bitrate(kbps: u32) -> Bitrate {
    match kbps {
        0..=64 => Bitrate::Kbps64,
        65..=128 => Bitrate::Kbps128,
        129..=192 => Bitrate::Kbps192,
        _ => Bitrate::Kbps320,
    }
}

struct LameStream {
    encoder: mp3lame_encoder::Encoder,
}

impl StreamingEncoder for LameStream {
    fn encode_block(&mut self, block: &[&[i16]], out: &mut Vec<u8>) -> Result<(), String> {
        let frames = block.first().map(|channel| channel.len()).unwrap_or(0);
        out.reserve(mp3lame_encoder::max_required_buffer_size(frames));
        let result = match block {
            [mono] => self.encoder.encode_to_vec(MonoPcm(*mono), out),
            [left, right, ..] => self.encoder.encode_to_vec(
                DualPcm {
                    left: *left,
                    right: *right,
                },
                out,
            ),
            [] => return Ok(()),
        };
        result.map(|_| ()).map_err(|err| format!("{err:?}"))
    }

    fn flush(&mut self, out: &mut Vec<u8>) -> Result<(), String> {
        out.reserve(FLUSH_RESERVE_BYTES);
        self.encoder
            .flush_to_vec::<FlushNoGap>(out)
            .map(|_| ())
            .map_err(|err| format!("{err:?}"))
    }
}

/// Encode planar float channels to MP3 through `backend`.
///
/// Inputs with more than two channels are reduced to the first two. Progress
/// advances linearly with blocks inside the encoding phase range.
pub fn encode_mp3(
    channels: &[&[f32]],
    sample_rate: u32,
    bitrate_kbps: u32,
    backend: &dyn Mp3Backend,
    pacer: &mut CooperativeYield,
    progress: &mut ProgressReporter<'_>,
) -> Result<Vec<u8>, EncodeError> {
    let channels = &channels[..channels.len().min(2)];
    let Some(first) = channels.first() else {
        return Err(EncodeError::encoder(OutputFormat::Mp3, "no channels to encode"));
    };
    let frames = first.len();
    let mut encoder = backend.open(Mp3StreamConfig {
        channels: channels.len() as u8,
        sample_rate,
        bitrate_kbps,
    })?;
    let total_blocks = frames.div_ceil(FRAMES_PER_BLOCK).max(1);
    debug!(frames, total_blocks, bitrate_kbps, "Encoding mp3");
    let mut out = Vec::new();
    let mut scratch: Vec<Vec<i16>> = vec![Vec::with_capacity(FRAMES_PER_BLOCK); channels.len()];
    for (index, start) in (0..frames).step_by(FRAMES_PER_BLOCK).enumerate() {
        let end = (start + FRAMES_PER_BLOCK).min(frames);
        for (buffer, channel) in scratch.iter_mut().zip(channels) {
            buffer.clear();
            buffer.extend(channel[start..end].iter().copied().map(to_i16));
        }
        let block: Vec<&[i16]> = scratch.iter().map(Vec::as_slice).collect();
        encoder
            .encode_block(&block, &mut out)
            .map_err(|err| EncodeError::encoder(OutputFormat::Mp3, err))?;
        progress.report_fraction(
            EncodePhase::Encoding,
            (index + 1) as f32 / total_blocks as f32,
        );
        pacer.tick()?;
    }
    encoder
        .flush(&mut out)
        .map_err(|err| EncodeError::encoder(OutputFormat::Mp3, err))?;
    Ok(out)
}
