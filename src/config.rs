//! Extractor settings persisted as TOML under the application directory.

mod io;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encode::{DispatchOptions, HostProfile, OutputFormat, QualityTier, StrategyPreference};
use crate::interaction::{
    COARSE_TOUCH_THRESHOLD_PX, HitThresholds, MOUSE_THRESHOLD_PX, TOUCH_THRESHOLD_PX,
};
use crate::waveform::DEFAULT_BUCKET_COUNT;

pub use io::{config_path, load_from_path, load_or_default, save, save_to_path};

/// File name of the settings file inside the app directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

const MIN_RECORDING_TIMEOUT_SECS: u64 = 1;
const MAX_WAVEFORM_BUCKETS: usize = 4_096;

/// Errors that may occur while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to create the config directory.
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to read the config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to write the config file.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not valid TOML or does not match the schema.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    /// No usable config directory found.
    #[error("No suitable config directory found")]
    NoConfigDir,
}

/// All persisted settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub output: OutputSettings,
    pub pipeline: PipelineSettings,
    pub interaction: InteractionSettings,
    pub engine: EngineSettings,
    pub host: HostSettings,
}

/// Default output choice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub format: OutputFormat,
    pub quality: QualityTier,
}

/// Encode pipeline tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub strategy: StrategyPreference,
    pub waveform_buckets: usize,
    pub recording_timeout_secs: u64,
    pub yield_every_blocks: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            strategy: StrategyPreference::Local,
            waveform_buckets: DEFAULT_BUCKET_COUNT,
            recording_timeout_secs: 600,
            yield_every_blocks: 32,
        }
    }
}

/// Handle hit radii in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionSettings {
    pub mouse_threshold_px: f64,
    pub touch_threshold_px: f64,
    pub coarse_touch_threshold_px: f64,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            mouse_threshold_px: MOUSE_THRESHOLD_PX,
            touch_threshold_px: TOUCH_THRESHOLD_PX,
            coarse_touch_threshold_px: COARSE_TOUCH_THRESHOLD_PX,
        }
    }
}

/// External engine location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub ffmpeg_path: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

/// Declared host capabilities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Input containers that must go through recording capture.
    pub forced_capture_containers: Vec<String>,
    /// Formats with a sample-level encoder.
    pub direct_formats: Vec<OutputFormat>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            forced_capture_containers: Vec::new(),
            direct_formats: vec![OutputFormat::Mp3, OutputFormat::Wav],
        }
    }
}

impl ExtractorConfig {
    /// Clamp values into their usable ranges.
    pub fn normalized(mut self) -> Self {
        let defaults = PipelineSettings::default();
        self.pipeline.waveform_buckets =
            self.pipeline.waveform_buckets.clamp(1, MAX_WAVEFORM_BUCKETS);
        self.pipeline.recording_timeout_secs =
            self.pipeline.recording_timeout_secs.max(MIN_RECORDING_TIMEOUT_SECS);
        if self.pipeline.yield_every_blocks == 0 {
            self.pipeline.yield_every_blocks = defaults.yield_every_blocks;
        }
        let interaction_defaults = InteractionSettings::default();
        self.interaction.mouse_threshold_px = positive_or(
            self.interaction.mouse_threshold_px,
            interaction_defaults.mouse_threshold_px,
        );
        self.interaction.touch_threshold_px = positive_or(
            self.interaction.touch_threshold_px,
            interaction_defaults.touch_threshold_px,
        );
        self.interaction.coarse_touch_threshold_px = positive_or(
            self.interaction.coarse_touch_threshold_px,
            interaction_defaults.coarse_touch_threshold_px,
        );
        if self.engine.ffmpeg_path.as_os_str().is_empty() {
            self.engine = EngineSettings::default();
        }
        let mut direct_formats = Vec::new();
        for format in self.host.direct_formats.drain(..) {
            if !format.has_sample_encoder() {
                tracing::warn!("Ignoring direct format {format}; no built-in encoder");
                continue;
            }
            if !direct_formats.contains(&format) {
                direct_formats.push(format);
            }
        }
        self.host.direct_formats = direct_formats;
        self
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            strategy: self.pipeline.strategy,
            recording_timeout: Duration::from_secs(self.pipeline.recording_timeout_secs),
            yield_every_blocks: self.pipeline.yield_every_blocks,
        }
    }

    pub fn host_profile(&self) -> HostProfile {
        HostProfile::new(
            self.host.direct_formats.clone(),
            self.host.forced_capture_containers.clone(),
        )
    }

    pub fn hit_thresholds(&self) -> HitThresholds {
        HitThresholds {
            mouse_px: self.interaction.mouse_threshold_px,
            touch_px: self.interaction.touch_threshold_px,
            coarse_touch_px: self.interaction.coarse_touch_threshold_px,
        }
    }
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}
