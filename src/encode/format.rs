use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Output container/codec.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp3,
    Wav,
    Aac,
    Flac,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Mp3,
        OutputFormat::Wav,
        OutputFormat::Aac,
        OutputFormat::Flac,
    ];

    /// Lower-case name, also used as the file extension.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
            OutputFormat::Aac => "aac",
            OutputFormat::Flac => "flac",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "audio/mpeg",
            OutputFormat::Wav => "audio/wav",
            OutputFormat::Aac => "audio/aac",
            OutputFormat::Flac => "audio/flac",
        }
    }

    /// Formats this crate can encode straight from samples.
    pub fn has_sample_encoder(self) -> bool {
        matches!(self, OutputFormat::Mp3 | OutputFormat::Wav)
    }

    /// Lossless formats take no bitrate.
    pub fn is_lossless(self) -> bool {
        matches!(self, OutputFormat::Wav | OutputFormat::Flac)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_ascii_lowercase();
        OutputFormat::ALL
            .into_iter()
            .find(|format| format.extension() == lowered)
            .ok_or_else(|| format!("Unknown format '{value}' (expected mp3, wav, aac or flac)"))
    }
}

/// Quality tier selecting a bitrate for lossy formats.
///
/// The names do not follow bitrate order: `UltraLow` is the 320 kbps tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityTier {
    UltraLow,
    High,
    #[default]
    Medium,
    Low,
}

impl QualityTier {
    pub const ALL: [QualityTier; 4] = [
        QualityTier::UltraLow,
        QualityTier::High,
        QualityTier::Medium,
        QualityTier::Low,
    ];

    pub fn bitrate_kbps(self) -> u32 {
        match self {
            QualityTier::UltraLow => 320,
            QualityTier::High => 192,
            QualityTier::Medium => 128,
            QualityTier::Low => 64,
        }
    }

    /// Name used in configuration and filenames.
    pub fn name(self) -> &'static str {
        match self {
            QualityTier::UltraLow => "ultra-low",
            QualityTier::High => "high",
            QualityTier::Medium => "medium",
            QualityTier::Low => "low",
        }
    }

    /// Bitrate label for `format`, or the lossless label.
    pub fn label_for(self, format: OutputFormat) -> String {
        if format.is_lossless() {
            "lossless, fixed".to_string()
        } else {
            format!("{} ({}kbps)", self.name(), self.bitrate_kbps())
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_ascii_lowercase();
        QualityTier::ALL
            .into_iter()
            .find(|tier| tier.name() == lowered)
            .ok_or_else(|| {
                format!("Unknown quality '{value}' (expected ultra-low, high, medium or low)")
            })
    }
}

/// Bitrate for a format/tier pair; `None` for lossless formats.
pub fn bitrate_for(format: OutputFormat, tier: QualityTier) -> Option<u32> {
    (!format.is_lossless()).then(|| tier.bitrate_kbps())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_mapping_is_fixed() {
        let expected = [
            (QualityTier::UltraLow, 320),
            (QualityTier::High, 192),
            (QualityTier::Medium, 128),
            (QualityTier::Low, 64),
        ];
        for (tier, kbps) in expected {
            assert_eq!(tier.bitrate_kbps(), kbps);
            assert_eq!(bitrate_for(OutputFormat::Mp3, tier), Some(kbps));
            assert_eq!(bitrate_for(OutputFormat::Aac, tier), Some(kbps));
        }
    }

    #[test]
    fn lossless_formats_ignore_tier() {
        for tier in QualityTier::ALL {
            assert_eq!(bitrate_for(OutputFormat::Wav, tier), None);
            assert_eq!(bitrate_for(OutputFormat::Flac, tier), None);
            assert_eq!(tier.label_for(OutputFormat::Flac), "lossless, fixed");
        }
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("FLAC".parse::<OutputFormat>(), Ok(OutputFormat::Flac));
        assert_eq!(" ultra-low".parse::<QualityTier>(), Ok(QualityTier::UltraLow));
        assert!("ogg".parse::<OutputFormat>().is_err());
        assert!("best".parse::<QualityTier>().is_err());
    }

    #[test]
    fn mime_types_match_formats() {
        assert_eq!(OutputFormat::Mp3.mime_type(), "audio/mpeg");
        assert_eq!(OutputFormat::Wav.mime_type(), "audio/wav");
        assert_eq!(OutputFormat::Aac.mime_type(), "audio/aac");
        assert_eq!(OutputFormat::Flac.mime_type(), "audio/flac");
    }
}
