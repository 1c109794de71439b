use crate::error::ConfigError;
use crate::sampler::BurstSettings;
use crate::sampler::sampling_loop::{DEFAULT_BURST_ITERATIONS, DEFAULT_SAMPLE_INTERVAL};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable that enables or disables disk sampling
pub const ENABLED_ENV_VAR: &str = "DISKMON_PRINT_ENABLED";

/// Upper bound on the pause between sampling iterations
pub const MAX_SAMPLE_INTERVAL_MS: u64 = 60_000;

/// Serializes tests that touch [`ENABLED_ENV_VAR`]
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Top-level configuration file layout
///
/// ```toml
/// [monitor]
/// enabled = true
/// burst_iterations = 30
/// sample_interval_ms = 800
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
}

/// Settings for the disk monitor itself
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Whether `start()` launches the sampling worker at all
    pub enabled: bool,
    /// Sampling iterations per burst
    pub burst_iterations: u32,
    /// Pause after each sampling iteration, in milliseconds
    pub sample_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            burst_iterations: DEFAULT_BURST_ITERATIONS,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL.as_millis() as u64,
        }
    }
}

impl MonitorConfig {
    pub fn burst_settings(&self) -> BurstSettings {
        BurstSettings {
            iterations: self.burst_iterations,
            interval: Duration::from_millis(self.sample_interval_ms),
        }
    }
}

/// Parse a textual enable flag; only `true` and `false` are accepted, in any case
pub fn parse_enabled_flag(value: &str) -> Result<bool, ConfigError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ConfigError::InvalidValue(format!(
            "Invalid option {} for disk print enabled. Choose 'true' or 'false'.",
            value
        )))
    }
}

/// Resolve an optional textual enable flag, defaulting to enabled
///
/// Missing and malformed values both mean enabled; malformed ones are logged.
pub fn resolve_enabled_flag(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(value) => match parse_enabled_flag(value) {
            Ok(enabled) => enabled,
            Err(e) => {
                error!("{}", e);
                true
            }
        },
    }
}

/// Read the enable flag from [`ENABLED_ENV_VAR`]
///
/// Returns `None` when the variable is unset. A value that is not valid
/// Unicode is passed through as an invalid option.
pub fn enabled_flag_from_env() -> Option<String> {
    match std::env::var(ENABLED_ENV_VAR) {
        Ok(value) => Some(value),
        Err(std::env::VarError::NotPresent) => None,
        Err(std::env::VarError::NotUnicode(raw)) => Some(raw.to_string_lossy().into_owned()),
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Read and validate a TOML configuration file
    ///
    /// # Errors
    ///
    /// `ConfigError::ReadError` if the file can't be read, `ParseError` if it
    /// is not valid TOML for this layout, `InvalidValue` if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        content.parse()
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.burst_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "monitor.burst_iterations must be at least 1".to_string(),
            ));
        }

        if self.monitor.sample_interval_ms > MAX_SAMPLE_INTERVAL_MS {
            return Err(ConfigError::InvalidValue(format!(
                "monitor.sample_interval_ms must not exceed {}",
                MAX_SAMPLE_INTERVAL_MS
            )));
        }

        Ok(())
    }

    /// Load configuration from file or use defaults
    ///
    /// Never fails: an unreadable file falls back to defaults with a warning,
    /// an invalid one with an error.
    pub fn load(path: Option<&Path>) -> Config {
        match path {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                match Config::from_file(path) {
                    Ok(config) => config,
                    Err(ConfigError::ReadError(e)) => {
                        warn!("Configuration file not found or unreadable ({}), using defaults", e);
                        Config::default()
                    }
                    Err(e) => {
                        error!("Configuration error in '{}': {}", path.display(), e);
                        warn!("Using default configuration due to invalid config file");
                        Config::default()
                    }
                }
            }
            None => {
                info!("Using default configuration");
                Config::default()
            }
        }
    }

    /// Let [`ENABLED_ENV_VAR`] override the file's `enabled` setting when set
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = enabled_flag_from_env() {
            self.apply_enabled_override(&value);
        }
    }

    /// Apply a textual enable flag on top of the current configuration
    pub fn apply_enabled_override(&mut self, value: &str) {
        self.monitor.enabled = resolve_enabled_flag(Some(value));
        info!(
            "Disk monitor enabled={} (from {})",
            self.monitor.enabled, ENABLED_ENV_VAR
        );
    }
}
