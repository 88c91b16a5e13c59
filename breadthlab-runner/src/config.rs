//! `breadthlab.toml` configuration.
//!
//! Every section and key is optional; a missing file yields the defaults.
//!
//! ```toml
//! [storage]
//! data_dir = "data"
//!
//! [refresh]
//! lookback_days = 450
//! parallel = true
//! threads = 4
//!
//! [sentiment]
//! breadth_window_days = 90
//!
//! [screen]
//! min_turnover10 = 1500000.0
//! rsi_min = 60.0
//! rsi_max = 70.0
//!
//! [cache]
//! ttl_secs = 300
//! ```

use breadthlab_core::analysis::{ScreenCriteria, DEFAULT_BREADTH_WINDOW_DAYS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "breadthlab.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub refresh: RefreshConfig,
    pub sentiment: SentimentConfig,
    pub screen: ScreenCriteria,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the Parquet store.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Calendar days of history loaded before the target date.
    pub lookback_days: i64,
    pub parallel: bool,
    /// Size of a dedicated thread pool; `None` uses rayon's global pool.
    pub threads: Option<usize>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            lookback_days: 450,
            parallel: true,
            threads: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentConfig {
    pub breadth_window_days: i64,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            breadth_window_days: DEFAULT_BREADTH_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    /// Load from a TOML file; a missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML string and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh.lookback_days <= 0 {
            return Err(ConfigError::Invalid {
                key: "refresh.lookback_days",
                reason: "must be positive".into(),
            });
        }
        if self.refresh.threads == Some(0) {
            return Err(ConfigError::Invalid {
                key: "refresh.threads",
                reason: "must be at least 1".into(),
            });
        }
        if self.sentiment.breadth_window_days <= 0 {
            return Err(ConfigError::Invalid {
                key: "sentiment.breadth_window_days",
                reason: "must be positive".into(),
            });
        }
        if self.screen.rsi_min > self.screen.rsi_max {
            return Err(ConfigError::Invalid {
                key: "screen.rsi_min",
                reason: format!(
                    "{} is above rsi_max {}",
                    self.screen.rsi_min, self.screen.rsi_max
                ),
            });
        }
        Ok(())
    }
}
