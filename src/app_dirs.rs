//! Application directory helpers anchored to a single `.waveline` folder.
//!
//! The helpers centralize where the summary cache, config, and log files live
//! across platforms, defaulting to the OS cache directory and allowing a
//! `WAVELINE_CACHE_HOME` override for tests or portable setups.

use std::{
    path::PathBuf,
    sync::{LazyLock, Mutex},
};

use directories::BaseDirs;
use thiserror::Error;

/// Name of the application directory that lives under the OS cache root.
pub const APP_DIR_NAME: &str = ".waveline";

static CACHE_BASE_OVERRIDE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

/// Errors that can occur while resolving or preparing application directories.
#[derive(Debug, Error)]
pub enum AppDirError {
    /// No suitable base cache directory could be resolved.
    #[error("No suitable base cache directory available for application files")]
    NoBaseDir,
    /// Failed to create the application directory.
    #[error("Failed to create application directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Return the root `.waveline` directory, creating it if needed.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let base = cache_base_dir().ok_or(AppDirError::NoBaseDir)?;
    let path = base.join(APP_DIR_NAME);
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Return the summary cache directory, creating it (and any missing parents)
/// if needed.
pub fn cache_dir() -> Result<PathBuf, AppDirError> {
    let path = app_root_dir()?.join("cache");
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Return the logs directory inside the `.waveline` root, creating it if
/// needed.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    let path = app_root_dir()?.join("logs");
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn cache_base_dir() -> Option<PathBuf> {
    if let Some(path) = CACHE_BASE_OVERRIDE
        .lock()
        .ok()
        .and_then(|guard| guard.clone())
    {
        return Some(path);
    }
    if let Ok(path) = std::env::var("WAVELINE_CACHE_HOME") {
        return Some(PathBuf::from(path));
    }
    BaseDirs::new().map(|dirs| dirs.cache_dir().to_path_buf())
}

#[cfg(test)]
fn set_cache_base_override(path: PathBuf) {
    let mut guard = CACHE_BASE_OVERRIDE
        .lock()
        .expect("cache base override mutex poisoned");
    *guard = Some(path);
}

#[cfg(test)]
fn clear_cache_base_override() {
    let mut guard = CACHE_BASE_OVERRIDE
        .lock()
        .expect("cache base override mutex poisoned");
    *guard = None;
}
