//! Recency-ordered connection cache

use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use poolkeep_core::Connection;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::stats::EntrySnapshot;
use crate::PoolKey;

/// A cached connection with its usage timestamps
pub(crate) struct PoolEntry {
    /// Identifies this entry among all entries ever created for any key
    id: u64,
    connection: Arc<dyn Connection>,
    created_at: Instant,
    last_used_at: Instant,
    /// Task watching the connection for asynchronous faults
    fault_watch: Option<JoinHandle<()>>,
}

impl PoolEntry {
    pub(crate) fn new(
        id: u64,
        connection: Arc<dyn Connection>,
        now: Instant,
        fault_watch: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            id,
            connection,
            created_at: now,
            last_used_at: now,
            fault_watch,
        }
    }

    fn touch(&mut self, now: Instant) {
        self.last_used_at = now;
    }

    /// Stop watching for faults and hand back the connection for closing
    pub(crate) fn into_connection(mut self) -> Arc<dyn Connection> {
        if let Some(watch) = self.fault_watch.take() {
            watch.abort();
        }
        self.connection
    }
}

/// Outcome of looking a key up in the cache
pub(crate) enum Lookup {
    /// A live connection; the entry is now the most recently used
    Hit(Arc<dyn Connection>),
    /// The entry's connection was no longer live and has been removed
    Stale(PoolEntry),
    Miss,
}

/// Key → entry map ordered by recency of use.
///
/// The cache itself is unbounded; capacity is enforced by
/// [`PoolCache::evict_over_capacity`] so every evicted connection can be
/// closed by the caller.
pub(crate) struct PoolCache {
    entries: LruCache<PoolKey, PoolEntry>,
}

impl PoolCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Look up `key`, promoting a live entry to most recently used.
    ///
    /// An entry whose connection is not live is removed and returned as
    /// [`Lookup::Stale`] so the caller can close it.
    pub(crate) fn lookup(&mut self, key: &PoolKey, now: Instant) -> Lookup {
        match self.entries.get_mut(key) {
            None => return Lookup::Miss,
            Some(entry) if entry.connection.is_connected() => {
                entry.touch(now);
                return Lookup::Hit(entry.connection.clone());
            }
            Some(_) => {}
        }
        match self.entries.pop(key) {
            Some(entry) => Lookup::Stale(entry),
            None => Lookup::Miss,
        }
    }

    /// Insert as most recently used, returning any entry it displaced
    pub(crate) fn insert(&mut self, key: PoolKey, entry: PoolEntry) -> Option<PoolEntry> {
        self.entries.put(key, entry)
    }

    pub(crate) fn remove(&mut self, key: &PoolKey) -> Option<PoolEntry> {
        self.entries.pop(key)
    }

    /// Remove the entry for `key` only if it is still the entry with `id`
    pub(crate) fn remove_if_current(&mut self, key: &PoolKey, id: u64) -> Option<PoolEntry> {
        match self.entries.peek(key) {
            Some(entry) if entry.id == id => self.entries.pop(key),
            _ => None,
        }
    }

    /// Remove every entry unused for longer than `idle_timeout` as of `now`
    pub(crate) fn evict_idle(
        &mut self,
        now: Instant,
        idle_timeout: Duration,
    ) -> Vec<(PoolKey, PoolEntry)> {
        let expired: Vec<PoolKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_used_at) > idle_timeout)
            .map(|(key, _)| key.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| self.entries.pop(&key).map(|entry| (key, entry)))
            .collect()
    }

    /// Remove least recently used entries until at most `max_entries` remain
    pub(crate) fn evict_over_capacity(&mut self, max_entries: usize) -> Vec<(PoolKey, PoolEntry)> {
        let mut evicted = Vec::new();
        while self.entries.len() > max_entries {
            match self.entries.pop_lru() {
                Some(pair) => evicted.push(pair),
                None => break,
            }
        }
        evicted
    }

    /// Remove every entry, least recently used first
    pub(crate) fn drain(&mut self) -> Vec<(PoolKey, PoolEntry)> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some(pair) = self.entries.pop_lru() {
            drained.push(pair);
        }
        drained
    }

    /// Keys, least recently used first
    pub(crate) fn keys(&self) -> Vec<PoolKey> {
        self.entries.iter().rev().map(|(key, _)| key.clone()).collect()
    }

    /// Per-entry ages as of `now`, least recently used first
    pub(crate) fn snapshots(&self, now: Instant) -> Vec<EntrySnapshot> {
        self.entries
            .iter()
            .rev()
            .map(|(key, entry)| EntrySnapshot {
                key: key.to_string(),
                age: now.saturating_duration_since(entry.created_at),
                idle: now.saturating_duration_since(entry.last_used_at),
                connected: entry.connection.is_connected(),
            })
            .collect()
    }
}

impl Default for PoolCache {
    fn default() -> Self {
        Self::new()
    }
}
