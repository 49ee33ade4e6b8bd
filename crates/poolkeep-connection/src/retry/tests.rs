//! Tests for backoff math and the retrying connection factory

use std::time::Duration;

use poolkeep_core::PoolkeepError;
use pretty_assertions::assert_eq;

use super::{BackoffStrategy, RetryPolicy, connect_with_retry};
use crate::testing::{MockConnector, config};
use crate::{PoolKey, PoolOptions};

fn policy(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, BackoffStrategy::new(1000).with_factor(2.0))
}

fn key_for(server: &str) -> PoolKey {
    PoolKey::from_config(&config(server))
}

// =============================================================================
// BackoffStrategy tests
// =============================================================================

#[test]
fn test_base_delay_grows_exponentially() {
    let backoff = BackoffStrategy::new(1000).with_factor(2.0);
    assert_eq!(backoff.base_delay(1), Duration::from_millis(1000));
    assert_eq!(backoff.base_delay(2), Duration::from_millis(2000));
    assert_eq!(backoff.base_delay(3), Duration::from_millis(4000));
}

#[test]
fn test_base_delay_floors_fractional_millis() {
    let backoff = BackoffStrategy::new(100).with_factor(1.5);
    // 100 * 1.5^2 = 225, 100 * 1.5^3 = 337.5
    assert_eq!(backoff.base_delay(3), Duration::from_millis(225));
    assert_eq!(backoff.base_delay(4), Duration::from_millis(337));
}

#[test]
fn test_jitter_bounds() {
    let backoff = BackoffStrategy::new(1000).with_jitter(0.3);
    assert_eq!(backoff.delay_with_sample(1, 0.0), Duration::from_millis(1000));
    assert_eq!(backoff.delay_with_sample(1, 0.5), Duration::from_millis(1150));
    assert_eq!(backoff.delay_with_sample(2, 0.999), Duration::from_millis(2599));
}

#[test]
fn test_random_jitter_stays_in_range() {
    let backoff = BackoffStrategy::new(1000).with_jitter(0.3);
    for _ in 0..100 {
        let delay = backoff.calculate_delay(1);
        assert!(delay >= Duration::from_millis(1000), "{:?}", delay);
        assert!(delay < Duration::from_millis(1300), "{:?}", delay);
    }
}

#[test]
fn test_zero_jitter_is_deterministic() {
    let backoff = BackoffStrategy::new(500);
    assert_eq!(backoff.calculate_delay(2), Duration::from_millis(1000));
}

#[test]
fn test_factor_and_jitter_are_clamped() {
    let backoff = BackoffStrategy::new(0).with_factor(0.5).with_jitter(2.0);
    assert_eq!(backoff.base(), Duration::from_millis(1));
    assert_eq!(backoff.factor(), 1.0);
    assert_eq!(backoff.jitter(), 1.0);

    let backoff = BackoffStrategy::default().with_factor(f64::INFINITY).with_jitter(f64::NAN);
    assert_eq!(backoff.factor(), 2.0);
    assert_eq!(backoff.jitter(), 0.0);
}

#[test]
fn test_policy_from_options() {
    let options = PoolOptions {
        retry_attempts: 5,
        retry_delay_ms: 250,
        retry_backoff_factor: 3.0,
        retry_jitter: 0.0,
        connect_timeout_ms: 0,
        ..PoolOptions::default()
    };
    let policy = RetryPolicy::from_options(&options);
    assert_eq!(policy.attempts(), 5);
    assert_eq!(policy.backoff().base_delay(2), Duration::from_millis(750));
    assert_eq!(policy.attempt_timeout(), None);

    let default = RetryPolicy::default();
    assert_eq!(default.attempts(), 3);
    assert_eq!(default.attempt_timeout(), Some(Duration::from_secs(15)));
}

#[test]
fn test_policy_requires_one_attempt() {
    assert_eq!(policy(0).attempts(), 1);
}

// =============================================================================
// connect_with_retry tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_first_attempt_success() {
    let connector = MockConnector::new();
    let conn = connect_with_retry(&connector, &config("db"), &key_for("db"), &policy(3))
        .await
        .expect("connect");

    assert!(conn.is_connected());
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_schedule() {
    let connector = MockConnector::failing_first(2);
    let conn = connect_with_retry(&connector, &config("db"), &key_for("db"), &policy(3))
        .await
        .expect("third attempt succeeds");

    assert!(conn.is_connected());
    assert_eq!(connector.attempts(), 3);

    let times = connector.attempt_times();
    assert_eq!(times[1] - times[0], Duration::from_millis(1000));
    assert_eq!(times[2] - times[1], Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_reports_last_error() {
    let connector = MockConnector::always_failing();
    let err = match connect_with_retry(&connector, &config("db"), &key_for("db"), &policy(3)).await
    {
        Ok(_) => panic!("expected failure"),
        Err(e) => e,
    };

    // no fourth attempt after the budget is spent
    assert_eq!(connector.attempts(), 3);
    assert!(err.is_creation());
    match &err {
        PoolkeepError::Creation { key, attempts, .. } => {
            assert_eq!(key, "app@db:1433/master");
            assert_eq!(*attempts, 3);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.root_cause().to_string(), "Connection error: attempt 3 refused");
}

#[tokio::test(start_paused = true)]
async fn test_single_attempt_does_not_sleep() {
    let connector = MockConnector::always_failing();
    let started = tokio::time::Instant::now();
    let result = connect_with_retry(&connector, &config("db"), &key_for("db"), &policy(1)).await;

    assert!(result.is_err());
    assert_eq!(connector.attempts(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_hung_attempt_times_out_and_retries() {
    let connector = MockConnector::hanging_first(1);
    let policy = policy(2).with_attempt_timeout(Some(Duration::from_secs(5)));
    let conn = connect_with_retry(&connector, &config("db"), &key_for("db"), &policy)
        .await
        .expect("second attempt succeeds");

    assert!(conn.is_connected());
    assert_eq!(connector.attempts(), 2);
    let times = connector.attempt_times();
    assert_eq!(times[1] - times[0], Duration::from_millis(6000));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_error_when_every_attempt_hangs() {
    let connector = MockConnector::hanging_first(1);
    let policy = policy(1).with_attempt_timeout(Some(Duration::from_millis(200)));
    let err = match connect_with_retry(&connector, &config("db"), &key_for("db"), &policy).await {
        Ok(_) => panic!("expected timeout"),
        Err(e) => e,
    };
    assert!(matches!(err.root_cause(), PoolkeepError::Timeout(_)));
}

#[tokio::test(start_paused = true)]
async fn test_dead_on_arrival_counts_as_failure() {
    let connector = MockConnector::dead_on_arrival_first(1);
    let conn = connect_with_retry(&connector, &config("db"), &key_for("db"), &policy(3))
        .await
        .expect("second attempt succeeds");

    assert!(conn.is_connected());
    assert_eq!(connector.attempts(), 2);

    let dead = connector.connection(0);
    assert!(dead.is_closed());
    assert_eq!(dead.close_calls(), 1);
}
