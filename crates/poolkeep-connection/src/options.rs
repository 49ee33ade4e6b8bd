//! Pool options and partial updates

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_ENTRIES: usize = 100;
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 10 * 60 * 1000;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_RETRY_BACKOFF_FACTOR: f64 = 2.0;
const DEFAULT_RETRY_JITTER: f64 = 0.3;
const DEFAULT_AUTO_CLEANUP_INTERVAL_MS: u64 = 60 * 1000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;

/// Configuration for the pool manager
///
/// Values are always valid once they reach the manager: [`PoolOptions::sanitized`]
/// and [`PoolOptions::apply`] replace anything out of range instead of
/// rejecting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// How many distinct pool keys to keep (at least 1)
    pub max_entries: usize,
    /// Evict entries unused for longer than this; 0 disables idle eviction
    pub idle_timeout_ms: u64,
    /// Run eviction opportunistically inside `get_or_create`
    pub enable_auto_cleanup: bool,
    /// Connection attempts per creation (at least 1)
    pub retry_attempts: u32,
    /// Delay before the first retry
    pub retry_delay_ms: u64,
    /// Multiplier applied to the delay for every further retry (at least 1.0)
    pub retry_backoff_factor: f64,
    /// Fraction of the delay added as random jitter, 0.0 to 1.0
    pub retry_jitter: f64,
    /// Period of the background sweeper
    pub auto_cleanup_interval_ms: u64,
    /// Limit for a single connection attempt; 0 disables
    pub connect_timeout_ms: u64,
}

impl Default for PoolOptions {
    /// Defaults:
    /// - max_entries: 100
    /// - idle_timeout: 10 minutes
    /// - auto cleanup: enabled, every minute
    /// - retries: 3 attempts, 1s base delay, 2x backoff, 30% jitter
    /// - connect timeout: 15 seconds
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            enable_auto_cleanup: true,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            retry_backoff_factor: DEFAULT_RETRY_BACKOFF_FACTOR,
            retry_jitter: DEFAULT_RETRY_JITTER,
            auto_cleanup_interval_ms: DEFAULT_AUTO_CLEANUP_INTERVAL_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl PoolOptions {
    /// Replace out-of-range values with their nearest valid setting
    pub fn sanitized(mut self) -> Self {
        if self.max_entries < 1 {
            self.max_entries = 1;
        }
        if self.retry_attempts < 1 {
            self.retry_attempts = DEFAULT_RETRY_ATTEMPTS;
        }
        if self.retry_delay_ms < 1 {
            self.retry_delay_ms = DEFAULT_RETRY_DELAY_MS;
        }
        if !valid_factor(self.retry_backoff_factor) {
            self.retry_backoff_factor = DEFAULT_RETRY_BACKOFF_FACTOR;
        }
        if !valid_jitter(self.retry_jitter) {
            self.retry_jitter = DEFAULT_RETRY_JITTER;
        }
        if self.auto_cleanup_interval_ms < 1 {
            self.auto_cleanup_interval_ms = DEFAULT_AUTO_CLEANUP_INTERVAL_MS;
        }
        self
    }

    /// Merge a partial update, clamping each supplied value
    pub fn apply(&mut self, update: &PoolOptionsUpdate) {
        if let Some(max) = update.max_entries {
            self.max_entries = if max < 1 {
                1
            } else {
                usize::try_from(max).unwrap_or(usize::MAX)
            };
        }
        if let Some(ms) = update.idle_timeout_ms {
            self.idle_timeout_ms = u64::try_from(ms).unwrap_or(DEFAULT_IDLE_TIMEOUT_MS);
        }
        if let Some(enabled) = update.enable_auto_cleanup {
            self.enable_auto_cleanup = enabled;
        }
        if let Some(attempts) = update.retry_attempts {
            self.retry_attempts = if attempts < 1 {
                DEFAULT_RETRY_ATTEMPTS
            } else {
                u32::try_from(attempts).unwrap_or(u32::MAX)
            };
        }
        if let Some(ms) = update.retry_delay_ms {
            self.retry_delay_ms = positive_ms(ms).unwrap_or(DEFAULT_RETRY_DELAY_MS);
        }
        if let Some(factor) = update.retry_backoff_factor {
            self.retry_backoff_factor = if valid_factor(factor) {
                factor
            } else {
                DEFAULT_RETRY_BACKOFF_FACTOR
            };
        }
        if let Some(jitter) = update.retry_jitter {
            self.retry_jitter = if valid_jitter(jitter) {
                jitter
            } else {
                DEFAULT_RETRY_JITTER
            };
        }
        if let Some(ms) = update.auto_cleanup_interval_ms {
            self.auto_cleanup_interval_ms =
                positive_ms(ms).unwrap_or(DEFAULT_AUTO_CLEANUP_INTERVAL_MS);
        }
        if let Some(ms) = update.connect_timeout_ms {
            self.connect_timeout_ms = u64::try_from(ms).unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS);
        }
    }

    /// Idle timeout, or `None` when idle eviction is disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    pub fn auto_cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.auto_cleanup_interval_ms.max(1))
    }

    /// Per-attempt connect timeout, or `None` when disabled
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }
}

fn positive_ms(ms: i64) -> Option<u64> {
    u64::try_from(ms).ok().filter(|ms| *ms >= 1)
}

fn valid_factor(factor: f64) -> bool {
    factor.is_finite() && factor >= 1.0
}

fn valid_jitter(jitter: f64) -> bool {
    (0.0..=1.0).contains(&jitter)
}

/// A partial options update for [`PoolOptions::apply`].
///
/// Integer fields are signed so out-of-range input (e.g. a negative timeout
/// read from a settings file) can be expressed and clamped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptionsUpdate {
    pub max_entries: Option<i64>,
    pub idle_timeout_ms: Option<i64>,
    pub enable_auto_cleanup: Option<bool>,
    pub retry_attempts: Option<i64>,
    pub retry_delay_ms: Option<i64>,
    pub retry_backoff_factor: Option<f64>,
    pub retry_jitter: Option<f64>,
    pub auto_cleanup_interval_ms: Option<i64>,
    pub connect_timeout_ms: Option<i64>,
}

impl PoolOptionsUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max_entries: i64) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn with_idle_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.idle_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_auto_cleanup(mut self, enabled: bool) -> Self {
        self.enable_auto_cleanup = Some(enabled);
        self
    }

    pub fn with_retry_attempts(mut self, attempts: i64) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn with_retry_delay_ms(mut self, delay_ms: i64) -> Self {
        self.retry_delay_ms = Some(delay_ms);
        self
    }

    pub fn with_retry_backoff_factor(mut self, factor: f64) -> Self {
        self.retry_backoff_factor = Some(factor);
        self
    }

    pub fn with_retry_jitter(mut self, jitter: f64) -> Self {
        self.retry_jitter = Some(jitter);
        self
    }

    pub fn with_auto_cleanup_interval_ms(mut self, interval_ms: i64) -> Self {
        self.auto_cleanup_interval_ms = Some(interval_ms);
        self
    }

    pub fn with_connect_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.connect_timeout_ms = Some(timeout_ms);
        self
    }
}
