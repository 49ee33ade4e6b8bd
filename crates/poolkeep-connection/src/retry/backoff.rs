//! Exponential backoff calculator for connection retry
//!
//! Implements exponential backoff with additive jitter for retry delays,
//! preventing synchronized retry storms when many callers reconnect.

use std::time::Duration;

/// Exponential backoff strategy for connection retries.
///
/// The delay before retry `n + 1` (after failed attempt `n`, counting from 1) is
///
/// ```text
/// delay  = floor(base * factor^(n - 1))
/// jitter = floor(delay * sample * jitter_fraction)   sample in [0, 1)
/// total  = delay + jitter
/// ```
///
/// # Example
///
/// ```
/// use poolkeep_connection::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::new(1000).with_factor(2.0);
///
/// assert_eq!(backoff.base_delay(1), Duration::from_millis(1000));
/// assert_eq!(backoff.base_delay(2), Duration::from_millis(2000));
/// assert_eq!(backoff.base_delay(3), Duration::from_millis(4000));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffStrategy {
    /// Delay in milliseconds after the first failed attempt
    base_ms: u64,
    /// Multiplier for exponential growth (default: 2.0)
    factor: f64,
    /// Fraction of the delay that may be added as jitter (default: 0.0)
    jitter: f64,
}

impl BackoffStrategy {
    /// Create a backoff strategy with the given base delay.
    pub fn new(base_ms: u64) -> Self {
        Self {
            base_ms: base_ms.max(1),
            factor: 2.0,
            jitter: 0.0,
        }
    }

    /// Set the multiplier for exponential growth. Values below 1.0 become 1.0.
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = if factor.is_finite() { factor.max(1.0) } else { 2.0 };
        self
    }

    /// Set the jitter fraction, clamped to `[0, 1]`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_nan() {
            0.0
        } else {
            jitter.clamp(0.0, 1.0)
        };
        self
    }

    /// Delay without jitter after failed attempt `attempt` (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = (self.base_ms as f64) * self.factor.powi(exponent);
        Duration::from_millis(delay_ms.floor() as u64)
    }

    /// Delay after failed attempt `attempt` using the given jitter sample.
    ///
    /// `sample` is expected in `[0, 1)`; it is clamped into that range.
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let delay = self.base_delay(attempt);
        let delay_ms = delay.as_millis() as f64;
        let sample = if sample.is_nan() { 0.0 } else { sample.clamp(0.0, 1.0) };
        let jitter_ms = (delay_ms * sample * self.jitter).floor() as u64;
        delay.saturating_add(Duration::from_millis(jitter_ms))
    }

    /// Delay after failed attempt `attempt` with a random jitter sample.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if self.jitter == 0.0 {
            return self.base_delay(attempt);
        }
        self.delay_with_sample(attempt, rand::random::<f64>())
    }

    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }
}

impl Default for BackoffStrategy {
    /// Default backoff: 1s base, 2x factor, no jitter
    fn default() -> Self {
        Self::new(1000)
    }
}
