//! Startup warm-up and periodic pool reporting

use poolkeep_connection::{PoolKey, PoolManager};
use poolkeep_core::ConnectionConfig;

/// Outcome of connecting the configured targets at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmUpReport {
    pub connected: usize,
    pub failed: usize,
}

/// Connect every target concurrently and verify each with a ping.
///
/// Failures are logged and counted; they never abort startup.
#[tracing::instrument(skip_all, fields(targets = targets.len()))]
pub async fn warm_up(manager: &PoolManager, targets: &[ConnectionConfig]) -> WarmUpReport {
    let results = futures::future::join_all(targets.iter().map(|target| async move {
        let key = PoolKey::from_config(target);
        let connection = manager.get_or_create(target).await?;
        connection.ping().await?;
        Ok::<_, poolkeep_core::PoolkeepError>(key)
    }))
    .await;

    let mut report = WarmUpReport::default();
    for (target, result) in targets.iter().zip(results) {
        match result {
            Ok(key) => {
                tracing::info!(key = %key, "target ready");
                report.connected += 1;
            }
            Err(e) => {
                tracing::error!(
                    key = %PoolKey::from_config(target),
                    error = %e,
                    "target warm-up failed"
                );
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        connected = report.connected,
        failed = report.failed,
        "warm-up finished"
    );
    report
}

/// Log the pool's current statistics and entries
pub fn log_stats(manager: &PoolManager) {
    let stats = manager.stats();
    tracing::info!(
        entries = stats.entries(),
        in_flight = stats.in_flight(),
        max_entries = stats.max_entries(),
        utilization = stats.utilization(),
        sweeper_running = stats.sweeper_running(),
        "pool stats"
    );
    for entry in manager.entries() {
        tracing::debug!(
            key = %entry.key,
            age_secs = entry.age.as_secs(),
            idle_secs = entry.idle.as_secs(),
            connected = entry.connected,
            "pool entry"
        );
    }
}
