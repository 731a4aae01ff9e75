//! Configuration Module
//!
//! Loads client settings from `config.toml`, then applies environment
//! overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::location::Position;

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub report_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Where the session is persisted; the platform data dir when unset
    pub data_dir: Option<PathBuf>,
    /// Position reported until the first real fix arrives
    pub initial_position: Option<Position>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            report_interval_secs: 20,
            request_timeout_secs: 30,
            data_dir: None,
            initial_position: None,
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults if absent
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&default_config_path())
    }

    /// Load from an explicit file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => {
                info!("Loaded config from {:?}", path);
                Self::parse(&text)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {:?}, using defaults", path);
                Self::default()
            }
            Err(e) => return Err(ConfigError::Io(e.to_string())),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `WRU_API_URL` and `WRU_REPORT_INTERVAL_SECS` overrides
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("WRU_API_URL") {
            self.api_base_url = url;
        }

        if let Some(secs) = lookup("WRU_REPORT_INTERVAL_SECS") {
            self.report_interval_secs = secs.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("WRU_REPORT_INTERVAL_SECS is not a number: {}", secs))
            })?;
        }

        self.validate()
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.report_interval_secs == 0 {
            return Err(ConfigError::Invalid("report_interval_secs must be positive".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be positive".into()));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_base_url must not be empty".into()));
        }
        Ok(())
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("WhereAreYou")
        .join("config.toml")
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
