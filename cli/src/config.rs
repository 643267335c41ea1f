//! Configuration file for the `rewatch` binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rewatch_directory_watcher::Quota;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level configuration, read from TOML.
///
/// ```toml
/// [watch]
/// per_path_limit = 40
/// distinct_path_limit = 3
///
/// [output]
/// clear_screen = true
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewatchConfig {
    /// Admission limits for directory watchers.
    pub watch: Quota,

    /// Terminal output settings.
    pub output: OutputConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

impl RewatchConfig {
    /// Default location: `<config dir>/rewatch/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rewatch").join("config.toml"))
    }

    /// Load the configuration.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used if present, and built-in defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path().filter(|path| path.is_file()) {
                Some(path) => path,
                None => {
                    debug!("No configuration file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config =
            Self::from_toml(&text).with_context(|| format!("parsing config {}", path.display()))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Terminal output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Clear the screen when a new run starts.
    pub clear_screen: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { clear_screen: true }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `warn` or `rewatch_directory_watcher=debug`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}
