//! Location of the `.snipwave` directory that holds `config.toml` and `logs/`.

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use thiserror::Error;

pub const APP_DIR_NAME: &str = ".snipwave";

/// Replaces the OS config directory as the parent of [`APP_DIR_NAME`].
pub const CONFIG_HOME_ENV: &str = "SNIPWAVE_CONFIG_HOME";

#[derive(Debug, Error)]
pub enum AppDirError {
    #[error("No config directory is available for application files")]
    NoBaseDir,
    #[error("Failed to create application directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The `.snipwave` directory, created on first use.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let base = std::env::var_os(CONFIG_HOME_ENV)
        .map(PathBuf::from)
        .or_else(|| BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf()))
        .ok_or(AppDirError::NoBaseDir)?;
    root_under(&base)
}

pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(app_root_dir()?.join("logs"))
}

fn root_under(base: &Path) -> Result<PathBuf, AppDirError> {
    ensure_dir(base.join(APP_DIR_NAME))
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf, AppDirError> {
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
