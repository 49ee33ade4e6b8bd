//! Retrying connection factory

use std::sync::Arc;
use std::time::Duration;

use poolkeep_core::{Connection, ConnectionConfig, Connector, PoolkeepError, Result};

use super::BackoffStrategy;
use crate::{PoolKey, PoolOptions};

/// How many attempts to make and how long to wait between them
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total connection attempts (at least 1)
    attempts: u32,
    /// Backoff strategy for delays between attempts
    backoff: BackoffStrategy,
    /// Limit for a single attempt
    attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: BackoffStrategy) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
            attempt_timeout: None,
        }
    }

    /// Bound each individual attempt; a timed-out attempt counts as failed.
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Build the policy described by the retry fields of `options`
    pub fn from_options(options: &PoolOptions) -> Self {
        let backoff = BackoffStrategy::new(options.retry_delay_ms)
            .with_factor(options.retry_backoff_factor)
            .with_jitter(options.retry_jitter);
        Self::new(options.retry_attempts, backoff).with_attempt_timeout(options.connect_timeout())
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn backoff(&self) -> &BackoffStrategy {
        &self.backoff
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_options(&PoolOptions::default())
    }
}

/// Create a connection, retrying with backoff until the policy is exhausted.
///
/// Every attempt asks the connector for a fresh connection. The first
/// successful attempt returns immediately. When every attempt fails the
/// final attempt's error is returned inside [`PoolkeepError::Creation`].
#[tracing::instrument(skip_all, fields(key = %key, attempts = policy.attempts()))]
pub async fn connect_with_retry(
    connector: &dyn Connector,
    config: &ConnectionConfig,
    key: &PoolKey,
    policy: &RetryPolicy,
) -> Result<Arc<dyn Connection>> {
    let attempts = policy.attempts();
    let mut attempt = 1u32;

    loop {
        match attempt_once(connector, config, policy.attempt_timeout()).await {
            Ok(connection) => {
                if attempt > 1 {
                    tracing::info!(attempt, "connected after retry");
                } else {
                    tracing::debug!("connected");
                }
                return Ok(connection);
            }
            Err(err) if attempt >= attempts => {
                tracing::warn!(attempt, error = %err, "connect attempts exhausted");
                return Err(PoolkeepError::Creation {
                    key: key.to_string(),
                    attempts,
                    source: Box::new(err),
                });
            }
            Err(err) => {
                let delay = policy.backoff().calculate_delay(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "connect attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

async fn attempt_once(
    connector: &dyn Connector,
    config: &ConnectionConfig,
    timeout: Option<Duration>,
) -> Result<Arc<dyn Connection>> {
    let connecting = connector.connect(config);
    let connection = match timeout {
        Some(limit) => tokio::time::timeout(limit, connecting)
            .await
            .map_err(|_| {
                PoolkeepError::Timeout(format!("connection attempt exceeded {:?}", limit))
            })??,
        None => connecting.await?,
    };

    if !connection.is_connected() {
        if let Err(e) = connection.close().await {
            tracing::warn!(error = %e, "failed to close dead-on-arrival connection");
        }
        return Err(PoolkeepError::Connection(
            "connector returned a connection that is not connected".into(),
        ));
    }

    Ok(connection)
}
