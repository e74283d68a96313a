//! Bridge configuration: defaults, optional TOML file, env var overrides.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::models::log_buffer::DEFAULT_MAX_LINES;

pub const ENV_MAX_LOG_LINES: &str = "FFT_BRIDGE_MAX_LOG_LINES";
pub const ENV_PROGRESS_INTERVAL: &str = "FFT_BRIDGE_PROGRESS_INTERVAL";
pub const ENV_IDLE_POLL_MS: &str = "FFT_BRIDGE_IDLE_POLL_MS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Lines retained per task for display.
    pub max_log_lines: usize,
    /// Observer is notified each time progress crosses a multiple of this.
    pub progress_notify_interval: u64,
    /// Sleep between polls while the engine has nothing new.
    pub idle_poll_interval_ms: u64,
    pub benchmark: BenchmarkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub width: u32,
    pub height: u32,
    pub fp16: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_log_lines: DEFAULT_MAX_LINES,
            progress_notify_interval: 32,
            idle_poll_interval_ms: 1,
            benchmark: BenchmarkConfig::default(),
        }
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            fp16: true,
        }
    }
}

impl BridgeConfig {
    /// Defaults, then `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| BridgeError::io(path, e))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| BridgeError::ConfigParse {
            context: "toml",
            details: e.to_string(),
        })
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_number(ENV_MAX_LOG_LINES)? {
            self.max_log_lines = usize::try_from(value).map_err(|_| BridgeError::InvalidConfig {
                details: format!("{ENV_MAX_LOG_LINES} out of range"),
            })?;
        }
        if let Some(value) = env_number(ENV_PROGRESS_INTERVAL)? {
            self.progress_notify_interval = value;
        }
        if let Some(value) = env_number(ENV_IDLE_POLL_MS)? {
            self.idle_poll_interval_ms = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_log_lines == 0 {
            return Err(BridgeError::InvalidConfig {
                details: "max_log_lines must be at least 1".to_string(),
            });
        }
        if self.progress_notify_interval == 0 {
            return Err(BridgeError::InvalidConfig {
                details: "progress_notify_interval must be at least 1".to_string(),
            });
        }
        for (name, value) in [
            ("benchmark.width", self.benchmark.width),
            ("benchmark.height", self.benchmark.height),
        ] {
            if !value.is_power_of_two() {
                return Err(BridgeError::InvalidConfig {
                    details: format!("{name} must be a non-zero power of two, got {value}"),
                });
            }
        }
        Ok(())
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }
}

fn env_number(key: &'static str) -> Result<Option<u64>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| BridgeError::ConfigParse {
                context: key,
                details: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
