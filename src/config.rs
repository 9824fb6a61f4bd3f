//! Engine configuration.
//!
//! A small TOML file (`waveline.toml`) in the application root; every field
//! has a default so a missing or partial file is fine. Parse failures fall
//! back to defaults with a warning rather than aborting the host.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app_dirs;
use crate::summary::DEFAULT_BUCKET_COUNT;

const CONFIG_FILE_NAME: &str = "waveline.toml";

/// Tunable knobs for the summary engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Buckets stored per channel at decode time.
    pub bucket_count: usize,
    /// Tracks longer than this are never cached.
    pub max_cached_duration_seconds: f64,
    /// Collapse channels into one displayed row.
    pub mix_to_mono: bool,
    /// Foreground redraw tick interval.
    pub refresh_interval_ms: u64,
    /// Quiet period before a resize triggers re-derivation.
    pub resize_debounce_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bucket_count: DEFAULT_BUCKET_COUNT,
            max_cached_duration_seconds: 1_800.0,
            mix_to_mono: false,
            refresh_interval_ms: 33,
            resize_debounce_ms: 250,
        }
    }
}

impl EngineConfig {
    /// Load from the application root, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load() -> Self {
        let Ok(root) = app_dirs::app_root_dir() else {
            return Self::default();
        };
        Self::load_from(&root.join(CONFIG_FILE_NAME))
    }

    /// Load from an explicit path, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Self::default();
            }
            Err(err) => {
                tracing::warn!("Failed to read {}: {err}", path.display());
                return Self::default();
            }
        };
        match toml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Ignoring malformed {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// Redraw tick interval as a `Duration`.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Resize quiet period as a `Duration`.
    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }
}
