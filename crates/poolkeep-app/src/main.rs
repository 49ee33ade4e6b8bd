//! Poolkeep host process
//!
//! Loads settings, starts logging, builds the single pool manager for the
//! process, warms up the configured targets and closes every pooled
//! connection on Ctrl-C.

mod logging;
mod settings;
mod startup;

use anyhow::Context;
use poolkeep_connection::PoolManager;
use poolkeep_driver_mssql::MssqlConnector;

use crate::settings::AppSettings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = settings::resolve_path(std::env::args_os().nth(1));
    let settings = AppSettings::load(path.as_deref()).context("failed to load settings")?;

    if let Err(e) = logging::init(&settings.logging) {
        // Logging isn't initialized yet, so this is the one place for eprintln
        eprintln!("FATAL: Failed to initialize logging: {}", e);
        std::process::exit(1);
    }
    tracing::info!(
        settings = ?path,
        targets = settings.targets.len(),
        "Poolkeep starting"
    );

    let options = settings.pool_options();
    tracing::debug!(?options, "pool options");
    let manager = PoolManager::new(
        MssqlConnector::new().with_application_name("poolkeep"),
        options,
    );
    if settings.auto_cleanup {
        manager
            .start_auto_cleanup(None)
            .context("failed to start auto cleanup")?;
    }

    startup::warm_up(&manager, &settings.targets).await;

    run_until_shutdown(&manager, &settings).await?;

    tracing::info!("shutting down");
    manager.stop_auto_cleanup();
    manager.close_all().await;
    Ok(())
}

/// Log pool statistics periodically until Ctrl-C
async fn run_until_shutdown(manager: &PoolManager, settings: &AppSettings) -> anyhow::Result<()> {
    let Some(period) = settings.stats_interval() else {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        return Ok(());
    };

    let mut ticker = tokio::time::interval(period);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => startup::log_stats(manager),
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for shutdown signal")?;
                return Ok(());
            }
        }
    }
}
