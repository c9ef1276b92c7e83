//! Driver configuration using Figment.
//!
//! Settings are layered, later layers overriding earlier ones:
//! 1. Built-in defaults (the values the hardware protocol was tuned with)
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `PXI_SYNC_`, nested with `__`
//!    (e.g. `PXI_SYNC_LOAD__GEN_DATA_POLLS=200`)
//!
//! # Example
//! ```no_run
//! use pxi_sync::config::SyncConfig;
//!
//! let config = SyncConfig::load(Some("pxi-sync.toml".as_ref()))?;
//! println!("polling engine {} times", config.load.gen_data_polls);
//! # Ok::<(), pxi_sync::SyncError>(())
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    value::{Dict, Map},
    Figment, Profile, Provider,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "PXI_SYNC_";

/// Top-level driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SyncConfig {
    /// Device addressing
    pub device: DeviceConfig,
    /// Configuration-load handshake limits
    pub load: LoadConfig,
    /// Calibration DAC settings
    pub calibration: CalibrationConfig,
    /// Log output
    pub logging: LoggingConfig,
}

/// Device addressing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Bus address of the sync window (BAR1), programmed into the bridge.
    pub window_base: u32,
    /// Programmable-logic image to load at attach.
    pub firmware: Option<PathBuf>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            window_base: 0xF000_0000,
            firmware: None,
        }
    }
}

/// Configuration-load handshake limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Status polls while waiting for the engine to generate data
    pub gen_data_polls: u32,
    /// Delay between those polls in milliseconds
    pub gen_data_poll_interval_ms: u64,
    /// Filler words written after the image while waiting for done
    pub dummy_flush_words: u32,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            gen_data_polls: 100,
            gen_data_poll_interval_ms: 10,
            dummy_flush_words: 1100,
        }
    }
}

impl LoadConfig {
    /// Delay between "generating data" polls.
    pub fn gen_data_poll_interval(&self) -> Duration {
        Duration::from_millis(self.gen_data_poll_interval_ms)
    }
}

/// Calibration DAC settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Busy polls before a DAC write gives up
    pub busy_polls: u32,
    /// Delay between busy polls in microseconds
    pub busy_poll_interval_us: u64,
    /// Threshold code loaded for every PFI comparator (8 bits)
    pub pfi_threshold_code: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            busy_polls: 100,
            busy_poll_interval_us: 10,
            pfi_threshold_code: 60,
        }
    }
}

impl CalibrationConfig {
    /// Delay between busy polls.
    pub fn busy_poll_interval(&self) -> Duration {
        Duration::from_micros(self.busy_poll_interval_us)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Multi-line, human oriented
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level: trace, debug, info, warn or error
    pub level: String,
    /// Output format
    pub format: OutputFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: OutputFormat::default(),
        }
    }
}

/// Accepted values for [`LoggingConfig::level`].
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Provider for SyncConfig {
    fn metadata(&self) -> figment::Metadata {
        figment::Metadata::named("Driver Defaults")
    }

    fn data(&self) -> std::result::Result<Map<Profile, Dict>, figment::Error> {
        Serialized::defaults(SyncConfig::default()).data()
    }
}

impl SyncConfig {
    /// The layered figment: defaults, then `path` if given, then environment.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(SyncConfig::default());
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path))
    }

    /// Extract from an arbitrary figment and validate.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(SyncError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        if self.load.gen_data_polls == 0 {
            return Err(SyncError::Config(
                "load.gen_data_polls must be at least 1".to_string(),
            ));
        }
        if self.load.dummy_flush_words == 0 {
            return Err(SyncError::Config(
                "load.dummy_flush_words must be at least 1".to_string(),
            ));
        }
        if self.calibration.busy_polls == 0 {
            return Err(SyncError::Config(
                "calibration.busy_polls must be at least 1".to_string(),
            ));
        }

        if self.calibration.pfi_threshold_code > 0xFF {
            return Err(SyncError::Config(format!(
                "Invalid calibration.pfi_threshold_code {}. Must be 0-255",
                self.calibration.pfi_threshold_code
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.load.gen_data_polls, 100);
        assert_eq!(config.load.dummy_flush_words, 1100);
        assert_eq!(config.load.gen_data_poll_interval(), Duration::from_millis(10));
        assert_eq!(config.calibration.pfi_threshold_code, 60);
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[load]
gen_data_polls = 7

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = SyncConfig::from_figment(
            Figment::from(SyncConfig::default()).merge(Toml::file(file.path())),
        )
        .unwrap();

        assert_eq!(config.load.gen_data_polls, 7);
        assert_eq!(config.load.dummy_flush_words, 1100);
        assert_eq!(config.logging.format, OutputFormat::Json);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_rejects_zero_retries() {
        let figment = Figment::from(SyncConfig::default())
            .merge(Serialized::default("load.gen_data_polls", 0));
        let err = SyncConfig::from_figment(figment).unwrap_err();
        assert!(err.to_string().contains("gen_data_polls"));
    }

    #[test]
    fn test_rejects_bad_log_level() {
        let mut config = SyncConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_wide_threshold() {
        let mut config = SyncConfig::default();
        config.calibration.pfi_threshold_code = 256;
        assert!(config.validate().is_err());
        config.calibration.pfi_threshold_code = 255;
        assert!(config.validate().is_ok());
    }
}
