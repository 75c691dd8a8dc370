use std::sync::Arc;
use std::time::Duration;

use crate::{
    algorithms::{FixedWindow, RateLimitAlgorithm},
    clock::Clock,
    config::FixedWindowConfig,
    test_utils::{assert_well_formed, concurrent_allowed, manual_clock},
};

fn window(capacity: u64, secs: u64) -> FixedWindowConfig {
    FixedWindowConfig {
        capacity,
        window: Duration::from_secs(secs),
    }
}

#[test]
fn test_limit_and_new_window() {
    let clock = manual_clock();
    let limiter = FixedWindow::new(window(10, 60), clock.clone()).unwrap();
    let window_end = clock.now() + Duration::from_secs(60);

    for i in 0..10 {
        let result = limiter.decide("fw_user");
        assert!(result.allowed, "Request {} should be allowed", i);
        assert_eq!(result.remaining, 10 - i - 1);
        assert_eq!(result.reset_at, window_end, "reset is the exact window end");
        assert_well_formed(&result);
    }

    let result = limiter.decide("fw_user");
    assert!(!result.allowed, "Request beyond window limit should be denied");
    assert_eq!(result.remaining, 0);
    assert_eq!(result.reset_at, window_end);

    clock.advance(Duration::from_secs(60));
    let result = limiter.decide("fw_user");
    assert!(result.allowed, "Request in new window should be allowed");
    assert_eq!(result.remaining, 9);
    assert_eq!(result.reset_at, clock.now() + Duration::from_secs(60));
}

#[test]
fn test_window_is_still_closed_just_before_its_end() {
    let clock = manual_clock();
    let limiter = FixedWindow::new(window(2, 10), clock.clone()).unwrap();

    limiter.decide("user");
    limiter.decide("user");

    clock.advance(Duration::from_millis(9_999));
    assert!(!limiter.decide("user").allowed);

    clock.advance(Duration::from_millis(1));
    assert!(limiter.decide("user").allowed);
}

/// Up to twice the capacity can pass around a window boundary
#[test]
fn test_boundary_burst_is_preserved() {
    let clock = manual_clock();
    let limiter = FixedWindow::new(window(10, 60), clock.clone()).unwrap();

    assert!(limiter.decide("burst").allowed);
    clock.advance(Duration::from_millis(59_500));
    for _ in 0..9 {
        assert!(limiter.decide("burst").allowed);
    }

    clock.advance(Duration::from_millis(500));
    let allowed_in_new_window = (0..10).filter(|_| limiter.decide("burst").allowed).count();
    assert_eq!(
        allowed_in_new_window, 10,
        "19 requests pass within half a second across the boundary"
    );
}

#[test]
fn test_separate_rate_limits() {
    let clock = manual_clock();
    let limiter = FixedWindow::new(window(3, 60), clock).unwrap();

    for i in 0..3 {
        let result = limiter.decide("rate_limit_user1");
        assert!(result.allowed, "Request {} for user1 should be allowed", i);
    }
    assert!(!limiter.decide("rate_limit_user1").allowed);

    for i in 0..3 {
        let result = limiter.decide("rate_limit_user2");
        assert!(result.allowed, "Request {} for user2 should be allowed", i);
        assert_eq!(result.remaining, 2 - i);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests() {
    let clock = manual_clock();
    let limiter = Arc::new(FixedWindow::new(window(5, 60), clock).unwrap());

    let allowed = concurrent_allowed(Arc::clone(&limiter), "concurrent_test", 10).await;
    assert_eq!(allowed, 5, "Exactly 5 concurrent requests should be allowed");
    assert!(!limiter.decide("concurrent_test").allowed);
}
