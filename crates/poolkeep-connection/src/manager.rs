//! Pool manager: the keyed connection cache and its lifecycle API

mod sweeper;


use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, RwLock};
use poolkeep_core::{
    Connection, ConnectionConfig, ConnectionFault, Connector, PoolkeepError, Result,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use self::sweeper::Sweeper;
use crate::pool::{EntrySnapshot, Lookup, PoolCache, PoolEntry, PoolStats};
use crate::retry::{RetryPolicy, connect_with_retry};
use crate::{PoolKey, PoolOptions, PoolOptionsUpdate};

/// A connection creation shared by every caller asking for the same key
type PendingConnection = Shared<BoxFuture<'static, Result<Arc<dyn Connection>>>>;

/// Caches one live connection per logical target.
///
/// The manager is cheap to clone; clones share the same cache. Construct one
/// at startup and hand it to everything that needs database access.
///
/// Connections returned by [`PoolManager::get_or_create`] stay owned by the
/// pool: callers use them but never close them.
#[derive(Clone)]
pub struct PoolManager {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn Connector>,
    options: RwLock<PoolOptions>,
    cache: Mutex<PoolCache>,
    /// Creations in progress, one per key
    in_flight: Mutex<HashMap<PoolKey, PendingConnection>>,
    sweeper: Mutex<Sweeper>,
    next_entry_id: AtomicU64,
}

impl PoolManager {
    /// Create a manager with the given connector and options
    pub fn new<C: Connector>(connector: C, options: PoolOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector: Arc::new(connector),
                options: RwLock::new(options.sanitized()),
                cache: Mutex::new(PoolCache::new()),
                in_flight: Mutex::new(HashMap::new()),
                sweeper: Mutex::new(Sweeper::default()),
                next_entry_id: AtomicU64::new(1),
            }),
        }
    }

    /// Create a manager with default options
    pub fn with_defaults<C: Connector>(connector: C) -> Self {
        Self::new(connector, PoolOptions::default())
    }

    /// Return a live connection for the target described by `config`.
    ///
    /// This will:
    /// 1. Run an eviction pass if auto cleanup is enabled
    /// 2. Return the cached connection if it is still live
    /// 3. Otherwise join the creation already in progress for this key, or
    ///    start one that retries with backoff
    ///
    /// Concurrent callers for the same key share a single creation and
    /// receive the same connection. When every attempt fails the error is
    /// [`PoolkeepError::Creation`] and nothing is cached.
    #[tracing::instrument(skip(self, config), fields(key))]
    pub async fn get_or_create(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let key = PoolKey::from_config(config);
        tracing::Span::current().record("key", tracing::field::display(&key));

        self.inner.cleanup_if_needed();

        if let Some(connection) = self.inner.lookup(&key) {
            tracing::trace!("cache hit");
            return Ok(connection);
        }

        let pending = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(&key) {
                Some(pending) => {
                    tracing::debug!("joining connection creation in progress");
                    pending.clone()
                }
                None => {
                    // A creation may have finished between the lookup above and
                    // taking this lock; finished creations are cached before
                    // they leave the in-flight table.
                    if let Some(connection) = self.inner.lookup(&key) {
                        return Ok(connection);
                    }
                    let pending = self.begin_creation(key.clone(), config.clone());
                    in_flight.insert(key, pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Spawn the creation for `key` so it completes even if every caller
    /// waiting on it goes away.
    fn begin_creation(&self, key: PoolKey, config: ConnectionConfig) -> PendingConnection {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _in_flight = InFlightGuard {
                inner: &inner,
                key: &key,
            };
            let policy = RetryPolicy::from_options(&inner.options.read());
            tracing::debug!(key = %key, "creating connection");
            let connection =
                connect_with_retry(inner.connector.as_ref(), &config, &key, &policy).await?;
            Inner::register(&inner, key.clone(), connection.clone());
            tracing::info!(key = %key, "connection cached");
            Ok(connection)
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(PoolkeepError::Other(format!(
                    "connection creation task failed: {}",
                    e
                ))),
            }
        }
        .boxed()
        .shared()
    }

    /// Replace option values, clamping anything invalid.
    ///
    /// Supplying `auto_cleanup_interval_ms` while the sweeper runs restarts it
    /// with the new period.
    pub fn set_options(&self, update: PoolOptionsUpdate) {
        let options = {
            let mut options = self.inner.options.write();
            options.apply(&update);
            options.clone()
        };
        tracing::debug!(?options, "pool options updated");

        if update.auto_cleanup_interval_ms.is_some() {
            let mut sweeper = self.inner.sweeper.lock();
            if sweeper.is_running() {
                sweeper.restart(options.auto_cleanup_interval(), Arc::downgrade(&self.inner));
            }
        }
    }

    /// A copy of the current options
    pub fn get_options(&self) -> PoolOptions {
        self.inner.options.read().clone()
    }

    /// Start the background sweeper, restarting it if already running.
    ///
    /// Uses `interval_ms` when given and positive, otherwise the configured
    /// `auto_cleanup_interval_ms`. Also enables opportunistic cleanup.
    /// Must be called from within a Tokio runtime.
    pub fn start_auto_cleanup(&self, interval_ms: Option<u64>) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            PoolkeepError::Configuration("auto cleanup requires a Tokio runtime".into())
        })?;
        let period = match interval_ms {
            Some(ms) if ms > 0 => std::time::Duration::from_millis(ms),
            _ => self.inner.options.read().auto_cleanup_interval(),
        };

        self.inner
            .sweeper
            .lock()
            .start(runtime, period, Arc::downgrade(&self.inner));
        self.inner.options.write().enable_auto_cleanup = true;
        tracing::info!(period_ms = period.as_millis() as u64, "auto cleanup started");
        Ok(())
    }

    /// Stop the background sweeper and disable opportunistic cleanup
    pub fn stop_auto_cleanup(&self) {
        if self.inner.sweeper.lock().stop() {
            tracing::info!("auto cleanup stopped");
        }
        self.inner.options.write().enable_auto_cleanup = false;
    }

    /// Run both eviction passes now, regardless of the auto cleanup flag.
    ///
    /// Returns how many entries were evicted. Their connections are closed in
    /// the background.
    pub fn evict_now(&self) -> usize {
        self.inner.evict(true)
    }

    /// Close and remove every cached connection.
    ///
    /// Close failures are logged; the entries are removed regardless.
    #[tracing::instrument(skip(self))]
    pub async fn close_all(&self) {
        let drained = self.inner.cache.lock().drain();
        let count = drained.len();

        futures::future::join_all(
            drained
                .into_iter()
                .map(|(key, entry)| close_entry(key, entry, "close_all")),
        )
        .await;

        tracing::info!(count, "closed all pooled connections");
    }

    /// Close and remove the connection cached under `key`.
    ///
    /// Returns `false` when no entry exists for the key.
    #[tracing::instrument(skip(self))]
    pub async fn close_by_key(&self, key: &str) -> bool {
        let key = PoolKey::from_raw(key);
        let removed = self.inner.cache.lock().remove(&key);
        match removed {
            Some(entry) => {
                close_entry(key, entry, "close_by_key").await;
                true
            }
            None => false,
        }
    }

    /// Snapshot of cached keys, least recently used first.
    ///
    /// For diagnostics only: an entry may die right after the snapshot.
    pub fn list_keys(&self) -> Vec<String> {
        self.inner
            .cache
            .lock()
            .keys()
            .into_iter()
            .map(|key| key.to_string())
            .collect()
    }

    /// Ages and idle times of cached entries, least recently used first
    pub fn entries(&self) -> Vec<EntrySnapshot> {
        self.inner.cache.lock().snapshots(Instant::now())
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let entries = self.inner.cache.lock().len();
        let in_flight = self.inner.in_flight.lock().len();
        let max_entries = self.inner.options.read().max_entries;
        let sweeper_running = self.inner.sweeper.lock().is_running();
        PoolStats::new(entries, in_flight, max_entries, sweeper_running)
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Cached live connection for `key`, closing a dead one if found
    fn lookup(&self, key: &PoolKey) -> Option<Arc<dyn Connection>> {
        let lookup = self.cache.lock().lookup(key, Instant::now());
        match lookup {
            Lookup::Hit(connection) => Some(connection),
            Lookup::Stale(entry) => {
                tracing::info!(key = %key, "cached connection is no longer connected, replacing");
                dispatch_close(key.clone(), entry, "not connected");
                None
            }
            Lookup::Miss => None,
        }
    }

    /// Cache a freshly created connection and start watching it for faults
    fn register(this: &Arc<Self>, key: PoolKey, connection: Arc<dyn Connection>) {
        let id = this.next_entry_id.fetch_add(1, Ordering::Relaxed);
        let fault_watch = connection.subscribe_faults().map(|faults| {
            tokio::spawn(watch_faults(Arc::downgrade(this), key.clone(), id, faults))
        });

        let entry = PoolEntry::new(id, connection, Instant::now(), fault_watch);
        let displaced = this.cache.lock().insert(key.clone(), entry);
        if let Some(old) = displaced {
            dispatch_close(key, old, "replaced");
        }

        // Capacity is enforced after every insert; idle eviction follows the
        // auto cleanup flag.
        let auto_cleanup = this.options.read().enable_auto_cleanup;
        this.evict(auto_cleanup);
    }

    fn cleanup_if_needed(&self) {
        if self.options.read().enable_auto_cleanup {
            self.evict(true);
        }
    }

    /// Capacity pass always, preceded by the idle pass when `include_idle`
    fn evict(&self, include_idle: bool) -> usize {
        let (idle_timeout, max_entries) = {
            let options = self.options.read();
            (options.idle_timeout(), options.max_entries)
        };

        let (idle, over_capacity) = {
            let mut cache = self.cache.lock();
            let idle = match idle_timeout {
                Some(timeout) if include_idle => cache.evict_idle(Instant::now(), timeout),
                _ => Vec::new(),
            };
            (idle, cache.evict_over_capacity(max_entries))
        };

        let count = idle.len() + over_capacity.len();
        for (key, entry) in idle {
            dispatch_close(key, entry, "idle");
        }
        for (key, entry) in over_capacity {
            dispatch_close(key, entry, "capacity");
        }
        if count > 0 {
            tracing::debug!(count, "evicted pooled connections");
        }
        count
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.sweeper.get_mut().stop();
    }
}

/// Removes a key from the in-flight table when its creation task ends,
/// including by panic or cancellation.
struct InFlightGuard<'a> {
    inner: &'a Inner,
    key: &'a PoolKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.inner.in_flight.lock().remove(self.key);
    }
}

/// Close an evicted entry in the background without waiting for it
fn dispatch_close(key: PoolKey, entry: PoolEntry, reason: &'static str) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(close_entry(key, entry, reason));
        }
        Err(_) => {
            tracing::warn!(
                key = %key,
                reason,
                "no async runtime to close evicted connection; dropping it"
            );
            drop(entry.into_connection());
        }
    }
}

async fn close_entry(key: PoolKey, entry: PoolEntry, reason: &'static str) {
    let connection = entry.into_connection();
    match connection.close().await {
        Ok(()) => tracing::debug!(key = %key, reason, "closed pooled connection"),
        Err(e) => tracing::warn!(key = %key, reason, error = %e, "failed to close pooled connection"),
    }
}

/// Evict the entry `id` under `key` when its connection reports a fault
async fn watch_faults(
    inner: Weak<Inner>,
    key: PoolKey,
    id: u64,
    mut faults: broadcast::Receiver<ConnectionFault>,
) {
    let fault = match faults.recv().await {
        Ok(fault) => fault,
        Err(RecvError::Lagged(missed)) => {
            ConnectionFault::new(format!("{} fault notification(s) missed", missed))
        }
        Err(RecvError::Closed) => return,
    };
    tracing::error!(key = %key, fault = %fault, "pooled connection failed");

    let Some(inner) = inner.upgrade() else {
        return;
    };
    let removed = inner.cache.lock().remove_if_current(&key, id);
    if let Some(entry) = removed {
        dispatch_close(key, entry, "fault");
    }
}
