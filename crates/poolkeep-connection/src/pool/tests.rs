//! Tests for the connection cache and eviction passes

use std::sync::Arc;
use std::time::Duration;

use poolkeep_core::Connection;
use pretty_assertions::assert_eq;
use tokio::time::Instant;

use super::cache::{Lookup, PoolCache, PoolEntry};
use super::stats::PoolStats;
use crate::PoolKey;
use crate::testing::MockConnection;

fn key(name: &str) -> PoolKey {
    PoolKey::from_raw(format!("app@{}:1433/master", name))
}

fn entry(id: u64, at: Instant) -> (PoolEntry, Arc<MockConnection>) {
    let conn = Arc::new(MockConnection::new(id as usize, "db"));
    (PoolEntry::new(id, conn.clone(), at, None), conn)
}

fn same(returned: &Arc<dyn Connection>, conn: &Arc<MockConnection>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(returned), Arc::as_ptr(conn))
}

fn keys(cache: &PoolCache) -> Vec<String> {
    cache.keys().iter().map(|k| k.to_string()).collect()
}

// =============================================================================
// Lookup and recency tests
// =============================================================================

#[test]
fn test_lookup_miss() {
    let mut cache = PoolCache::new();
    assert!(matches!(cache.lookup(&key("a"), Instant::now()), Lookup::Miss));
}

#[test]
fn test_lookup_hit_updates_last_used() {
    let t0 = Instant::now();
    let mut cache = PoolCache::new();
    let (e, _) = entry(1, t0);
    cache.insert(key("a"), e);

    let later = t0 + Duration::from_millis(250);
    assert!(matches!(cache.lookup(&key("a"), later), Lookup::Hit(_)));

    let snapshot = &cache.snapshots(later)[0];
    assert_eq!(snapshot.idle, Duration::ZERO);
    assert_eq!(snapshot.age, Duration::from_millis(250));
}

#[test]
fn test_lookup_removes_dead_entry() {
    let t0 = Instant::now();
    let mut cache = PoolCache::new();
    let (e, conn) = entry(1, t0);
    cache.insert(key("a"), e);
    conn.kill();

    match cache.lookup(&key("a"), t0) {
        Lookup::Stale(stale) => assert!(same(&stale.into_connection(), &conn)),
        _ => panic!("expected stale entry"),
    }
    assert_eq!(cache.len(), 0);
}

#[test]
fn test_keys_are_least_recent_first() {
    let t0 = Instant::now();
    let mut cache = PoolCache::new();
    for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
        cache.insert(key(name), entry(id, t0).0);
    }
    cache.lookup(&key("a"), t0);

    assert_eq!(
        keys(&cache),
        vec![
            "app@b:1433/master".to_string(),
            "app@c:1433/master".to_string(),
            "app@a:1433/master".to_string(),
        ]
    );
}

#[test]
fn test_insert_returns_displaced_entry() {
    let t0 = Instant::now();
    let mut cache = PoolCache::new();
    let (first, first_conn) = entry(1, t0);
    cache.insert(key("a"), first);
    let displaced = cache.insert(key("a"), entry(2, t0).0).expect("displaced");
    assert!(same(&displaced.into_connection(), &first_conn));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_remove_if_current_ignores_replaced_entry() {
    let t0 = Instant::now();
    let mut cache = PoolCache::new();
    cache.insert(key("a"), entry(1, t0).0);
    cache.insert(key("a"), entry(2, t0).0);

    assert!(cache.remove_if_current(&key("a"), 1).is_none());
    assert_eq!(cache.len(), 1);
    assert!(cache.remove_if_current(&key("a"), 2).is_some());
    assert_eq!(cache.len(), 0);
}

// =============================================================================
// Capacity eviction tests
// =============================================================================

#[test]
fn test_capacity_evicts_least_recently_used() {
    // A, B, A, C with room for two: B is the one to go
    let t0 = Instant::now();
    let mut cache = PoolCache::new();
    cache.insert(key("a"), entry(1, t0).0);
    cache.insert(key("b"), entry(2, t0).0);
    cache.lookup(&key("a"), t0);
    cache.insert(key("c"), entry(3, t0).0);

    let evicted = cache.evict_over_capacity(2);
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].0, key("b"));
    assert_eq!(
        keys(&cache),
        vec!["app@a:1433/master".to_string(), "app@c:1433/master".to_string()]
    );
}

#[test]
fn test_capacity_evicts_down_to_limit() {
    let t0 = Instant::now();
    let mut cache = PoolCache::new();
    for id in 0..5u64 {
        cache.insert(key(&format!("s{}", id)), entry(id, t0).0);
    }

    let evicted = cache.evict_over_capacity(1);
    assert_eq!(evicted.len(), 4);
    assert_eq!(cache.len(), 1);
    assert_eq!(keys(&cache), vec!["app@s4:1433/master".to_string()]);
}

#[test]
fn test_capacity_eviction_is_idempotent() {
    let t0 = Instant::now();
    let mut cache = PoolCache::new();
    for id in 0..3u64 {
        cache.insert(key(&format!("s{}", id)), entry(id, t0).0);
    }
    assert_eq!(cache.evict_over_capacity(2).len(), 1);
    assert!(cache.evict_over_capacity(2).is_empty());
}

// =============================================================================
// Idle eviction tests
// =============================================================================

#[test]
fn test_idle_eviction_boundary() {
    let t0 = Instant::now();
    let idle = Duration::from_millis(1000);
    let mut cache = PoolCache::new();
    cache.insert(key("old"), entry(1, t0).0);
    cache.insert(key("recent"), entry(2, t0 + Duration::from_millis(500)).0);

    // exactly at the timeout nothing is strictly older than the cutoff
    assert!(cache.evict_idle(t0 + idle, idle).is_empty());

    let evicted = cache.evict_idle(t0 + idle + Duration::from_millis(1), idle);
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].0, key("old"));
    assert_eq!(keys(&cache), vec!["app@recent:1433/master".to_string()]);
}

#[test]
fn test_idle_eviction_is_idempotent() {
    let t0 = Instant::now();
    let idle = Duration::from_millis(100);
    let mut cache = PoolCache::new();
    cache.insert(key("a"), entry(1, t0).0);
    cache.insert(key("b"), entry(2, t0).0);

    let now = t0 + Duration::from_secs(1);
    assert_eq!(cache.evict_idle(now, idle).len(), 2);
    assert!(cache.evict_idle(now, idle).is_empty());
}

// =============================================================================
// Drain and entry tests
// =============================================================================

#[test]
fn test_drain_empties_cache() {
    let t0 = Instant::now();
    let mut cache = PoolCache::new();
    cache.insert(key("a"), entry(1, t0).0);
    cache.insert(key("b"), entry(2, t0).0);

    let drained: Vec<PoolKey> = cache.drain().into_iter().map(|(k, _)| k).collect();
    assert_eq!(drained, vec![key("a"), key("b")]);
    assert_eq!(cache.len(), 0);
    assert!(cache.keys().is_empty());
}

#[test]
fn test_into_connection_returns_same_connection() {
    let t0 = Instant::now();
    let (e, conn) = entry(7, t0);
    let returned = e.into_connection();
    assert!(same(&returned, &conn));
    assert!(returned.is_connected());
}

// =============================================================================
// PoolStats tests
// =============================================================================

#[test]
fn test_pool_stats_accessors() {
    let stats = PoolStats::new(3, 1, 10, true);
    assert_eq!(stats.entries(), 3);
    assert_eq!(stats.in_flight(), 1);
    assert_eq!(stats.max_entries(), 10);
    assert!(stats.sweeper_running());
}

#[test]
fn test_pool_stats_utilization() {
    assert!((PoolStats::new(5, 0, 10, false).utilization() - 0.5).abs() < 0.001);
    assert!((PoolStats::new(0, 0, 0, false).utilization() - 0.0).abs() < 0.001);
    assert!(PoolStats::new(10, 0, 10, false).is_full());
    assert!(!PoolStats::new(9, 0, 10, false).is_full());
}

#[test]
fn test_pool_stats_serialization() {
    let stats = PoolStats::new(4, 2, 8, false);
    let json = serde_json::to_string(&stats).expect("serialize");
    let deserialized: PoolStats = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(stats, deserialized);
}
