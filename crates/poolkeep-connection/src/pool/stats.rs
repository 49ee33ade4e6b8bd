//! Pool statistics types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Statistics about the pool manager's current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of cached entries
    entries: usize,
    /// Number of keys with a connection creation in progress
    in_flight: usize,
    /// Configured capacity
    max_entries: usize,
    /// Whether the background sweeper is running
    sweeper_running: bool,
}

impl PoolStats {
    pub fn new(entries: usize, in_flight: usize, max_entries: usize, sweeper_running: bool) -> Self {
        Self {
            entries,
            in_flight,
            max_entries,
            sweeper_running,
        }
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn sweeper_running(&self) -> bool {
        self.sweeper_running
    }

    /// Calculate capacity utilization (0.0 to 1.0, may exceed 1.0 between passes)
    ///
    /// Returns 0.0 if capacity is 0 to avoid division by zero.
    pub fn utilization(&self) -> f64 {
        if self.max_entries == 0 {
            0.0
        } else {
            self.entries as f64 / self.max_entries as f64
        }
    }

    /// Check if the next new key will force an LRU eviction
    pub fn is_full(&self) -> bool {
        self.max_entries > 0 && self.entries >= self.max_entries
    }
}

/// Point-in-time view of one cached entry, for diagnostics only.
///
/// An entry reported as connected may die immediately after the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub key: String,
    /// Time since the connection was created
    pub age: Duration,
    /// Time since the entry was last handed to a caller
    pub idle: Duration,
    pub connected: bool,
}
