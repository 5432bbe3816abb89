//! Auditioning the selected range before encoding it.
//!
//! A [`Session`](crate::session::Session) owns one [`AuditionOutput`] and
//! stops it whenever the file, the selection or the session goes away, so at
//! most one clip is ever playing.

use std::time::Duration;

use thiserror::Error;

use crate::encode::FrameRange;
use crate::selection::Selection;
use crate::signal::Signal;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("No decoded audio to play")]
    NoSignal,
    #[error("The selection holds no audio frames")]
    EmptySelection,
    #[error("Failed to open the audio output: {message}")]
    Output { message: String },
    #[error("Audio playback is not available in this build")]
    Unavailable,
}

/// Whether a play request started or stopped the audition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Stopped,
}

/// Interleaved samples of one selected range.
#[derive(Clone, Debug, PartialEq)]
pub struct AuditionClip {
    pub channels: u16,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl AuditionClip {
    /// Copy the frames under `selection`; `None` when that range is empty.
    pub fn from_selection(signal: &Signal, selection: Selection) -> Option<Self> {
        let range = FrameRange::for_selection(signal, Some(selection));
        if range.is_empty() {
            return None;
        }
        let channels: Vec<&[f32]> = signal
            .channels()
            .map(|channel| &channel[range.start..range.end])
            .collect();
        let mut samples = Vec::with_capacity(range.len() * channels.len());
        for frame in 0..range.len() {
            samples.extend(channels.iter().map(|channel| channel[frame]));
        }
        Some(Self {
            channels: channels.len() as u16,
            sample_rate: signal.sample_rate(),
            samples,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / f64::from(self.sample_rate.max(1)))
    }
}

/// Output that plays one clip at a time.
pub trait AuditionOutput {
    /// Replace whatever is playing with `clip`.
    fn play(&mut self, clip: AuditionClip) -> Result<(), PlaybackError>;
    fn stop(&mut self);
    fn is_playing(&self) -> bool;
    /// Stop and close the underlying device.
    fn release(&mut self) {
        self.stop();
    }
}

/// The platform's default output device through `rodio`.
///
/// The stream is opened on the first play and closed by `release`.
#[cfg(feature = "playback")]
#[derive(Default)]
pub struct RodioOutput {
    stream: Option<rodio::OutputStream>,
    sink: Option<rodio::Sink>,
}

#[cfg(feature = "playback")]
impl AuditionOutput for RodioOutput {
    fn play(&mut self, clip: AuditionClip) -> Result<(), PlaybackError> {
        self.stop();
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => rodio::OutputStreamBuilder::open_default_stream().map_err(|err| {
                PlaybackError::Output {
                    message: err.to_string(),
                }
            })?,
        };
        let sink = rodio::Sink::connect_new(stream.mixer());
        sink.append(rodio::buffer::SamplesBuffer::new(
            clip.channels,
            clip.sample_rate,
            clip.samples,
        ));
        sink.play();
        self.stream = Some(stream);
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn is_playing(&self) -> bool {
        self.sink.as_ref().is_some_and(|sink| !sink.empty())
    }

    fn release(&mut self) {
        self.stop();
        self.stream = None;
    }
}

/// Stand-in used when the crate is built without an audio backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOutput;

impl AuditionOutput for NoOutput {
    fn play(&mut self, _clip: AuditionClip) -> Result<(), PlaybackError> {
        Err(PlaybackError::Unavailable)
    }

    fn stop(&mut self) {}

    fn is_playing(&self) -> bool {
        false
    }
}

/// Output used by a new session.
pub fn default_output() -> Box<dyn AuditionOutput> {
    #[cfg(feature = "playback")]
    {
        Box::new(RodioOutput::default())
    }
    #[cfg(not(feature = "playback"))]
    {
        Box::new(NoOutput)
    }
}
