//! Background task running periodic eviction passes

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::Inner;

/// Handle to the periodic eviction task.
///
/// The task only holds a weak reference to the manager, so dropping the last
/// manager handle ends it on the next tick.
#[derive(Default)]
pub(super) struct Sweeper {
    task: Option<JoinHandle<()>>,
    /// Runtime the task was started on, reused when restarting
    runtime: Option<Handle>,
    period: Option<Duration>,
}

impl Sweeper {
    /// Start the task, replacing any task already running
    pub(super) fn start(&mut self, runtime: Handle, period: Duration, inner: Weak<Inner>) {
        self.stop();
        self.task = Some(runtime.spawn(sweep_loop(inner, period)));
        self.runtime = Some(runtime);
        self.period = Some(period);
    }

    /// Restart a running task with a new period
    pub(super) fn restart(&mut self, period: Duration, inner: Weak<Inner>) {
        if self.period == Some(period) {
            return;
        }
        if let Some(runtime) = self.runtime.clone() {
            tracing::debug!(period_ms = period.as_millis() as u64, "restarting auto cleanup");
            self.start(runtime, period, inner);
        }
    }

    /// Stop the task. Returns `false` if it was not running.
    pub(super) fn stop(&mut self) -> bool {
        self.period = None;
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub(super) fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

async fn sweep_loop(inner: Weak<Inner>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(manager) = inner.upgrade() else {
            tracing::debug!("pool manager dropped, auto cleanup exiting");
            return;
        };
        let evicted = manager.evict(true);
        if evicted > 0 {
            tracing::debug!(evicted, "auto cleanup pass");
        }
    }
}
