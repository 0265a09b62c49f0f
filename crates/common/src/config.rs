//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HotzoneError, HotzoneResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default export parameters.
    pub export: ExportDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default export parameters.
///
/// Every tuning value the pipeline uses lives here so runs can be
/// reproduced and tested across configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Side length of the activity grid.
    pub grid_size: usize,

    /// Fraction of the hottest cell a cell must exceed to count as hot.
    pub threshold: f64,

    /// Pass-1 sampling interval (seconds).
    pub sample_interval_secs: f64,

    /// Pass-1 sample cap.
    pub max_samples: usize,

    /// Pass-2 presentation step (seconds). 0.5 means 2 output frames per
    /// source second.
    pub frame_interval_secs: f64,

    /// Allowed timestamp drift when fetching a frame (seconds).
    pub fetch_tolerance_secs: f64,

    /// Delay between encoder readiness polls (milliseconds).
    pub backpressure_poll_ms: u64,

    /// Give up on an encoder that stays busy this long (milliseconds).
    pub backpressure_timeout_ms: u64,

    /// Emit a progress report every N pushed frames.
    pub progress_every: u64,

    /// Fraction of rows skipped at the bottom of the frame.
    pub skip_bottom_fraction: f64,

    /// Fraction of rows skipped at the top of the frame.
    pub skip_top_fraction: f64,

    /// Horizontal padding added to each side of the hot region.
    pub pad_x: f64,

    /// Vertical padding added to each side of the hot region.
    pub pad_y: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "hotzone_render=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            grid_size: 20,
            threshold: 0.40,
            sample_interval_secs: 10.0,
            max_samples: 20,
            frame_interval_secs: 0.5,
            fetch_tolerance_secs: 0.1,
            backpressure_poll_ms: 10,
            backpressure_timeout_ms: 30_000,
            progress_every: 10,
            skip_bottom_fraction: 0.05,
            skip_top_fraction: 0.30,
            pad_x: 0.03,
            pad_y: 0.08,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ExportDefaults {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> HotzoneResult<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(HotzoneError::config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if !(self.sample_interval_secs > 0.0) {
            return Err(HotzoneError::config("sample_interval_secs must be positive"));
        }
        if !(self.frame_interval_secs > 0.0) {
            return Err(HotzoneError::config("frame_interval_secs must be positive"));
        }
        if self.max_samples == 0 {
            return Err(HotzoneError::config("max_samples must be at least 1"));
        }
        if self.fetch_tolerance_secs < 0.0 {
            return Err(HotzoneError::config("fetch_tolerance_secs must not be negative"));
        }
        if self.skip_bottom_fraction < 0.0
            || self.skip_top_fraction < 0.0
            || self.skip_bottom_fraction + self.skip_top_fraction >= 1.0
        {
            return Err(HotzoneError::config(
                "search band fractions must be non-negative and leave rows to search",
            ));
        }
        if self.pad_x < 0.0 || self.pad_y < 0.0 {
            return Err(HotzoneError::config("padding must not be negative"));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load and validate config from an explicit path.
    pub fn load_from(path: &Path) -> HotzoneResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.export.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("hotzone").join("config.json")
}
