use std::path::Path;

use super::OutputFormat;

/// Host capabilities consulted when choosing an encode strategy.
pub trait CapabilityProbe {
    /// A sample-level encoder for `format` exists here.
    fn can_directly_encode(&self, format: OutputFormat) -> bool;
    /// Inputs in `container` must be captured through playback.
    fn requires_recording_capture(&self, container: &str) -> bool;
}

/// Capabilities declared by configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostProfile {
    direct_formats: Vec<OutputFormat>,
    forced_capture_containers: Vec<String>,
}

impl HostProfile {
    pub fn new(direct_formats: Vec<OutputFormat>, forced_capture_containers: Vec<String>) -> Self {
        Self {
            direct_formats,
            forced_capture_containers: forced_capture_containers
                .into_iter()
                .map(|container| normalize_container(&container))
                .filter(|container| !container.is_empty())
                .collect(),
        }
    }
}

impl Default for HostProfile {
    fn default() -> Self {
        Self::new(vec![OutputFormat::Mp3, OutputFormat::Wav], Vec::new())
    }
}

impl CapabilityProbe for HostProfile {
    fn can_directly_encode(&self, format: OutputFormat) -> bool {
        self.direct_formats.contains(&format)
    }

    fn requires_recording_capture(&self, container: &str) -> bool {
        let container = normalize_container(container);
        self.forced_capture_containers
            .iter()
            .any(|forced| *forced == container)
    }
}

/// Lower-case container name taken from a file name's extension.
pub fn container_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(normalize_container)
        .filter(|ext| !ext.is_empty())
}

fn normalize_container(value: &str) -> String {
    value.trim().trim_start_matches('.').to_ascii_lowercase()
}
