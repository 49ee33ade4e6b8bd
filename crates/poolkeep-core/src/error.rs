//! Error types for Poolkeep

use std::sync::Arc;

use thiserror::Error;

/// Core error type for Poolkeep operations
///
/// The type is `Clone` so a single connection attempt can hand the same
/// outcome to every caller waiting on it.
#[derive(Error, Debug, Clone)]
pub enum PoolkeepError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Connection is closed")]
    Closed,

    /// Every connection attempt for a pool key failed.
    ///
    /// `source` is the failure of the final attempt, unchanged.
    #[error("failed to connect to {key} after {attempts} attempt(s): {source}")]
    Creation {
        key: String,
        attempts: u32,
        #[source]
        source: Box<PoolkeepError>,
    },

    #[error("{0}")]
    Other(String),
}

impl PoolkeepError {
    /// The innermost error, looking through `Creation` wrappers.
    pub fn root_cause(&self) -> &PoolkeepError {
        match self {
            PoolkeepError::Creation { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether this is a creation failure after exhausting retries.
    pub fn is_creation(&self) -> bool {
        matches!(self, PoolkeepError::Creation { .. })
    }
}

impl From<std::io::Error> for PoolkeepError {
    fn from(err: std::io::Error) -> Self {
        PoolkeepError::Io(Arc::new(err))
    }
}

/// Result type alias for Poolkeep operations
pub type Result<T> = std::result::Result<T, PoolkeepError>;
