//! Agent configuration.
//!
//! Loaded once at startup from `<config_dir>/drivesense/config.json`,
//! optionally overridden by CLI flags, then fixed for the lifetime of the
//! run. There is no hot reload.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sampling cadence in Hz
    pub sample_rate_hz: u32,

    /// Samples per analysis window
    pub window_len: usize,

    /// New samples between consecutive windows (overlap = window - stride)
    pub stride: usize,

    /// Largest tolerated gap between consecutive samples, in ms
    pub max_gap_ms: i64,

    /// Minimum top-class confidence for a prediction to count
    pub confidence_threshold: f64,

    /// Consecutive confident predictions required to accept a downgrade
    pub debounce_count: u32,

    /// Consecutive missed cycles after which verdicts are flagged stale
    pub stale_threshold: u32,

    /// Consecutive read failures before the stream is reported unavailable
    pub sensor_fail_threshold: u32,

    /// I2C bus number
    pub bus: u8,

    /// I2C device address
    pub address: u16,

    /// Trained model artifact; the built-in reference model is used when unset
    pub model_path: Option<PathBuf>,

    /// Whether verdicts are pushed to the relay
    pub emit_enabled: bool,

    /// Relay endpoint receiving events
    pub emit_url: String,

    /// Directory for sample logs, summaries, and session stats
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("drivesense");

        Self {
            sample_rate_hz: 50,
            window_len: 50,
            stride: 25,
            max_gap_ms: 250,
            confidence_threshold: 0.70,
            debounce_count: 3,
            stale_threshold: 5,
            sensor_fail_threshold: 5,
            bus: 1,
            address: 0x68,
            model_path: None,
            emit_enabled: true,
            emit_url: "http://localhost:8000/emit".to_string(),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("drivesense")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Reject parameter combinations the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate_hz == 0 {
            return Err(ConfigError::Invalid("sample_rate_hz must be positive".into()));
        }
        if self.window_len < 2 {
            return Err(ConfigError::Invalid(
                "window_len must be at least 2 samples".into(),
            ));
        }
        if self.stride == 0 || self.stride > self.window_len {
            return Err(ConfigError::Invalid(format!(
                "stride must be between 1 and window_len ({})",
                self.window_len
            )));
        }
        if self.max_gap_ms <= 0 {
            return Err(ConfigError::Invalid("max_gap_ms must be positive".into()));
        }
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 1.0) {
            return Err(ConfigError::Invalid(
                "confidence_threshold must be in (0, 1]".into(),
            ));
        }
        if self.debounce_count == 0 {
            return Err(ConfigError::Invalid("debounce_count must be positive".into()));
        }
        if self.stale_threshold == 0 {
            return Err(ConfigError::Invalid("stale_threshold must be positive".into()));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("serialize error: {0}")]
    Serialize(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Parse an I2C address given as decimal or `0x`-prefixed hex.
pub fn parse_address(input: &str) -> Result<u16, ConfigError> {
    let trimmed = input.trim();
    let parsed = if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u16::from_str_radix(hex, 16)
    } else {
        trimmed.parse()
    };
    parsed.map_err(|_| ConfigError::Invalid(format!("invalid I2C address: {input:?}")))
}
