//! Settings file for the host process

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use poolkeep_connection::{PoolOptions, PoolOptionsUpdate};
use poolkeep_core::ConnectionConfig;
use serde::Deserialize;

use crate::logging::LoggingConfig;

/// Environment variable naming the settings file when no argument is given
pub const CONFIG_ENV: &str = "POOLKEEP_CONFIG";

const DEFAULT_STATS_INTERVAL_SECS: u64 = 60;

/// Everything the host process reads from its TOML settings file.
///
/// ```toml
/// auto_cleanup = true
///
/// [logging]
/// default_filter = "info,poolkeep_connection=debug"
///
/// [pool]
/// max_entries = 20
/// idle_timeout_ms = 300000
///
/// [[targets]]
/// server = "db.internal"
/// database = "sales"
/// user = "app"
/// password = "secret"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub logging: LoggingConfig,
    /// Overrides applied on top of the default pool options
    pub pool: PoolOptionsUpdate,
    /// Start the background sweeper at startup
    pub auto_cleanup: bool,
    /// How often to log pool statistics; 0 disables
    pub stats_interval_secs: u64,
    /// Targets connected during startup
    pub targets: Vec<ConnectionConfig>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::for_build(),
            pool: PoolOptionsUpdate::default(),
            auto_cleanup: true,
            stats_interval_secs: DEFAULT_STATS_INTERVAL_SECS,
            targets: Vec::new(),
        }
    }
}

impl AppSettings {
    /// Load settings from `path`; a missing path or file yields the defaults
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        Self::from_toml(&text)
            .with_context(|| format!("invalid settings file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Default pool options with the file's overrides applied and clamped
    pub fn pool_options(&self) -> PoolOptions {
        let mut options = PoolOptions::default();
        options.apply(&self.pool);
        options
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }
}

/// The settings file path: the first CLI argument, else `POOLKEEP_CONFIG`
pub fn resolve_path(arg: Option<OsString>) -> Option<PathBuf> {
    arg.or_else(|| std::env::var_os(CONFIG_ENV))
        .map(PathBuf::from)
}
