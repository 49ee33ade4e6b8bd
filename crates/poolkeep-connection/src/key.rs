//! Pool key derivation

use poolkeep_core::ConnectionConfig;
use serde::{Deserialize, Serialize};

/// Identity of a logical database target: `user@server:port/database`.
///
/// Configurations that render to the same string share one pool entry.
/// The password and transport options are not part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolKey(String);

impl PoolKey {
    /// Derive the key for a configuration, applying the default port and database
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self(format!(
            "{}@{}:{}/{}",
            config.effective_user(),
            config.server,
            config.effective_port(),
            config.effective_database()
        ))
    }

    /// Wrap an already-rendered key string, e.g. one returned by `list_keys`
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&ConnectionConfig> for PoolKey {
    fn from(config: &ConnectionConfig) -> Self {
        Self::from_config(config)
    }
}
