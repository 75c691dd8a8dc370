use std::sync::Arc;
use std::time::Duration;

use crate::{
    algorithms::{RateLimitAlgorithm, SlidingWindow},
    clock::Clock,
    config::SlidingWindowConfig,
    test_utils::{assert_well_formed, concurrent_allowed, manual_clock},
};

fn window(capacity: u64, window: Duration) -> SlidingWindowConfig {
    SlidingWindowConfig { capacity, window }
}

#[test]
fn test_entries_age_out_of_the_window() {
    let clock = manual_clock();
    let limiter = SlidingWindow::new(window(10, Duration::from_secs(60)), clock.clone()).unwrap();
    let start = clock.now();

    for i in 0..10 {
        let result = limiter.decide("sw_user");
        assert!(result.allowed, "Request {} should be allowed", i);
        assert_eq!(result.remaining, 10 - i - 1);
        assert_well_formed(&result);
    }

    clock.advance(Duration::from_millis(100));
    let result = limiter.decide("sw_user");
    assert!(!result.allowed, "Window is still full at t=0.1s");
    assert_eq!(result.remaining, 0);
    assert_eq!(result.reset_at, start + Duration::from_secs(60));

    clock.set(start + Duration::from_millis(60_100));
    let result = limiter.decide("sw_user");
    assert!(result.allowed, "All t=0 entries expired by t=60.1s");
    assert_eq!(result.remaining, 9);
}

#[test]
fn test_reset_follows_oldest_entry() {
    let clock = manual_clock();
    let limiter = SlidingWindow::new(window(2, Duration::from_secs(10)), clock.clone()).unwrap();
    let start = clock.now();

    let first = limiter.decide("user");
    assert_eq!(first.reset_at, start + Duration::from_secs(10));

    clock.advance(Duration::from_secs(5));
    let second = limiter.decide("user");
    assert!(second.allowed);
    assert_eq!(second.remaining, 0);
    assert_eq!(second.reset_at, start + Duration::from_secs(10));

    clock.advance(Duration::from_secs(1));
    let denied = limiter.decide("user");
    assert!(!denied.allowed);
    assert_eq!(denied.reset_at, start + Duration::from_secs(10));

    // At t=10 only the t=0 entry has expired
    clock.set(start + Duration::from_secs(10));
    let third = limiter.decide("user");
    assert!(third.allowed);
    assert_eq!(third.remaining, 0);
    assert_eq!(third.reset_at, start + Duration::from_secs(15));
}

/// Never more than capacity in any trailing window, unlike the fixed window
#[test]
fn test_no_boundary_burst() {
    let clock = manual_clock();
    let limiter = SlidingWindow::new(window(10, Duration::from_secs(60)), clock.clone()).unwrap();

    assert!(limiter.decide("burst").allowed);
    clock.advance(Duration::from_millis(59_500));
    for _ in 0..9 {
        assert!(limiter.decide("burst").allowed);
    }

    clock.advance(Duration::from_millis(500));
    let allowed = (0..10).filter(|_| limiter.decide("burst").allowed).count();
    assert_eq!(allowed, 1, "Only the slot freed by the first request reopens");
}

#[test]
fn test_idle_logs_are_purged() {
    let clock = manual_clock();
    let limiter = SlidingWindow::new(window(5, Duration::from_secs(1)), clock.clone()).unwrap();

    limiter.decide("a");
    limiter.decide("b");
    assert_eq!(limiter.tracked_keys(), 2);

    clock.advance(Duration::from_secs(2));
    assert_eq!(limiter.purge_idle(), 2);
    assert_eq!(limiter.tracked_keys(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests() {
    let clock = manual_clock();
    let limiter =
        Arc::new(SlidingWindow::new(window(8, Duration::from_secs(60)), clock).unwrap());

    let allowed = concurrent_allowed(Arc::clone(&limiter), "concurrent", 16).await;
    assert_eq!(allowed, 8);
}
