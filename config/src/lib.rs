//! Host configuration.
//!
//! Read from `~/.cardhost/config.toml` (or the file named by `CARDHOST_CONFIG`).
//! Every section and key is optional; a missing file yields the defaults.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use cardhost_types::{DEFAULT_FAST_REFRESH_PERIOD_MS, DEFAULT_REFRESH_PERIOD_MS, RefreshPeriods};

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "CARDHOST_CONFIG";

/// Capability tag providers declare to be discovered.
pub const DEFAULT_CAPABILITY: &str = "cardhost.CARD_PROVIDER";

/// Permission a provider must guard its endpoint with.
pub const DEFAULT_REQUIRED_PERMISSION: &str = "cardhost.permission.CARD_HOST";

pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
}

/// Refresh cadence for active cards.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Full refresh period. Default: 10000. Minimum: 5000.
    #[serde(default = "default_refresh_period_ms")]
    pub period_ms: u64,
    /// Readiness window for fast-updating components. Default: 1000. Minimum: 500.
    #[serde(default = "default_fast_refresh_period_ms")]
    pub fast_period_ms: u64,
}

impl RefreshConfig {
    /// Periods with the minimums applied.
    #[must_use]
    pub fn periods(&self) -> RefreshPeriods {
        RefreshPeriods::from_millis(self.period_ms, self.fast_period_ms)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_REFRESH_PERIOD_MS,
            fast_period_ms: DEFAULT_FAST_REFRESH_PERIOD_MS,
        }
    }
}

/// Which providers the host accepts.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_capability")]
    pub capability: String,
    /// Read and write permission every provider must declare, exactly.
    #[serde(default = "default_required_permission")]
    pub required_permission: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            capability: default_capability(),
            required_permission: default_required_permission(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkersConfig {
    /// Upper bound on concurrent remote calls. Default: 8. Minimum: 1.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl WorkersConfig {
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.max(1)
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

fn default_refresh_period_ms() -> u64 {
    DEFAULT_REFRESH_PERIOD_MS
}

fn default_fast_refresh_period_ms() -> u64 {
    DEFAULT_FAST_REFRESH_PERIOD_MS
}

fn default_capability() -> String {
    DEFAULT_CAPABILITY.to_string()
}

fn default_required_permission() -> String {
    DEFAULT_REQUIRED_PERMISSION.to_string()
}

fn default_max_in_flight() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}

impl HostConfig {
    /// Load from the default location. `Ok(None)` when no file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    /// Load from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

/// `CARDHOST_CONFIG` if set and non-empty, else `~/.cardhost/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".cardhost").join("config.toml"))
}
