//! Library exports for the CLI, benchmarks and tests.
/// Application directory helpers.
pub mod app_dirs;
/// Persisted extractor settings.
pub mod config;
/// Encode strategies, encoders and dispatch.
pub mod encode;
/// Timeline pointer handling.
pub mod interaction;
/// Tracing subscriber setup.
pub mod logging;
/// Selection audition through the audio output.
pub mod playback;
/// Progress reporting and encode results.
pub mod progress;
/// Selection math and timecodes.
pub mod selection;
/// Per-session pipeline state.
pub mod session;
/// Decoded audio signal.
pub mod signal;
/// Peak-reduced waveform preview.
pub mod waveform;
