use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{CONFIG_FILE_NAME, ConfigError, ExtractorConfig};
use crate::app_dirs::{self, AppDirError};

/// Resolve the configuration file path, ensuring the parent directory exists.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let dir = app_dirs::app_root_dir().map_err(map_app_dir_error)?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

/// Load configuration from the app directory, returning defaults if missing.
pub fn load_or_default() -> Result<ExtractorConfig, ConfigError> {
    load_from_path(&config_path()?)
}

/// Load configuration from `path`; a missing file yields defaults.
pub fn load_from_path(path: &Path) -> Result<ExtractorConfig, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "No config file; using defaults");
        return Ok(ExtractorConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ExtractorConfig = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "Loaded config");
    Ok(config.normalized())
}

/// Persist configuration to the app directory.
pub fn save(config: &ExtractorConfig) -> Result<(), ConfigError> {
    save_to_path(config, &config_path()?)
}

/// Write `config` to `path` atomically, creating parent directories as needed.
pub fn save_to_path(config: &ExtractorConfig, path: &Path) -> Result<(), ConfigError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::CreateDir {
        path: dir.clone(),
        source,
    })?;
    let data = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    let write_error = |source: std::io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut staged = tempfile::NamedTempFile::new_in(&dir).map_err(write_error)?;
    staged.write_all(data.as_bytes()).map_err(write_error)?;
    staged.as_file().sync_all().map_err(write_error)?;
    staged
        .persist(path)
        .map_err(|err| write_error(err.error))?;
    Ok(())
}

fn map_app_dir_error(error: AppDirError) -> ConfigError {
    match error {
        AppDirError::NoBaseDir => ConfigError::NoConfigDir,
        AppDirError::CreateDir { path, source } => ConfigError::CreateDir { path, source },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{OutputFormat, QualityTier};
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = load_from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ExtractorConfig::default());
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let mut config = ExtractorConfig::default();
        config.output.format = OutputFormat::Aac;
        config.output.quality = QualityTier::Low;
        config.host.forced_capture_containers = vec!["mov".into()];
        save_to_path(&config, &path).unwrap();
        let loaded = load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn invalid_toml_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[output]\nformat = \"ogg\"\n").unwrap();
        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { .. }));
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn loaded_values_are_normalized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[pipeline]\nwaveform_buckets = 0\n").unwrap();
        let config = load_from_path(&path).unwrap();
        assert_eq!(config.pipeline.waveform_buckets, 1);
    }
}
