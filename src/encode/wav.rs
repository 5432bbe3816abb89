use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use super::pcm::to_i16;

/// Write planar channels as a 16-bit PCM WAV container.
///
/// Mono and stereo inputs get the canonical 44-byte header; more channels
/// use the extensible header.
pub fn encode_wav(channels: &[&[f32]], sample_rate: u32) -> Result<Vec<u8>, String> {
    let channel_count =
        u16::try_from(channels.len()).map_err(|_| "Too many channels for WAV".to_string())?;
    if channel_count == 0 {
        return Err("No channels to write".into());
    }
    let spec = WavSpec {
        channels: channel_count,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let frames = channels[0].len();
    let mut cursor = Cursor::new(Vec::with_capacity(44 + frames * channels.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|err| format!("Failed to write wav: {err}"))?;
        for frame in 0..frames {
            for channel in channels {
                writer
                    .write_sample(to_i16(channel[frame]))
                    .map_err(|err| format!("Failed to write sample: {err}"))?;
            }
        }
        writer
            .finalize()
            .map_err(|err| format!("Failed to finalize wav: {err}"))?;
    }
    Ok(cursor.into_inner())
}
