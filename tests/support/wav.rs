use std::io::Cursor;

/// Mono sine at `freq` Hz, amplitude 0.5.
pub fn sine(seconds: f64, sample_rate: u32, freq: f32) -> Vec<f32> {
    let frames = (seconds * sample_rate as f64).round() as usize;
    (0..frames)
        .map(|i| 0.5 * (std::f32::consts::TAU * freq * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// 16-bit PCM WAV bytes holding `channels`, all of equal length.
pub fn wav_bytes(channels: &[Vec<f32>], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: channels.len() as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("create wav writer");
    let frames = channels.first().map(Vec::len).unwrap_or(0);
    for frame in 0..frames {
        for channel in channels {
            let value = (channel[frame].clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(value).expect("write wav sample");
        }
    }
    writer.finalize().expect("finalize wav");
    cursor.into_inner()
}

/// Length of the `data` chunk declared in a canonical 44-byte header.
pub fn data_chunk_len(bytes: &[u8]) -> u32 {
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[36..40], b"data");
    u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]])
}
