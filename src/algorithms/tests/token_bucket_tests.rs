use std::sync::Arc;
use std::time::Duration;

use crate::{
    algorithms::{RateLimitAlgorithm, TokenBucket},
    clock::Clock,
    config::TokenBucketConfig,
    error::RateLimiterError,
    test_utils::{assert_well_formed, concurrent_allowed, manual_clock},
};

fn bucket(capacity: u64, refill_rate: f64) -> TokenBucketConfig {
    TokenBucketConfig {
        capacity,
        refill_rate,
    }
}

/// Test token consumption and token depletion
#[test]
fn test_token_consumption_and_depletion() {
    let clock = manual_clock();
    let limiter = TokenBucket::new(bucket(5, 1.0), clock.clone()).unwrap();

    for i in 0..5 {
        let result = limiter.decide("consumption_test_user");
        assert!(result.allowed, "Request {} should be allowed", i);
        assert_eq!(
            result.remaining,
            5 - i - 1,
            "Should have {} tokens remaining",
            5 - i - 1
        );
        assert_well_formed(&result);
    }

    let result = limiter.decide("consumption_test_user");
    assert!(
        !result.allowed,
        "Request when tokens depleted should be denied"
    );
    assert_eq!(result.remaining, 0, "Should have 0 tokens remaining");
    assert_eq!(
        result.reset_after(clock.now()),
        Duration::from_secs(1),
        "One token comes back after 1/refill_rate seconds"
    );
}

#[test]
fn test_allowed_reset_points_at_full_bucket() {
    let clock = manual_clock();
    let limiter = TokenBucket::new(bucket(5, 2.0), clock.clone()).unwrap();

    let first = limiter.decide("user");
    assert_eq!(first.remaining, 4);
    assert_eq!(first.limit, 5);
    // One missing token at 2 tokens/s
    assert_eq!(first.reset_after(clock.now()), Duration::from_millis(500));

    limiter.decide("user");
    let third = limiter.decide("user");
    assert_eq!(third.remaining, 2);
    assert_eq!(third.reset_after(clock.now()), Duration::from_millis(1500));
}

/// Test token regeneration over time
#[test]
fn test_token_regeneration_over_time() {
    let clock = manual_clock();
    let limiter = TokenBucket::new(bucket(5, 1.0), clock.clone()).unwrap();

    for _ in 0..5 {
        assert!(limiter.decide("refill_user").allowed);
    }
    assert!(!limiter.decide("refill_user").allowed);

    clock.advance(Duration::from_secs(2));
    let result = limiter.decide("refill_user");
    assert!(result.allowed, "Two tokens should have been refilled");
    assert_eq!(result.remaining, 1);

    // Refill never exceeds capacity
    clock.advance(Duration::from_secs(1_000));
    let result = limiter.decide("refill_user");
    assert!(result.allowed);
    assert_eq!(result.remaining, 4);
}

#[test]
fn test_fractional_tokens_are_not_spendable() {
    let clock = manual_clock();
    let limiter = TokenBucket::new(bucket(1, 0.5), clock.clone()).unwrap();

    assert!(limiter.decide("slow").allowed);

    clock.advance(Duration::from_secs(1));
    let result = limiter.decide("slow");
    assert!(!result.allowed, "Half a token is not enough");
    assert_eq!(result.remaining, 0);
    assert_eq!(result.reset_after(clock.now()), Duration::from_secs(1));

    clock.advance(Duration::from_secs(1));
    assert!(limiter.decide("slow").allowed);
}

#[test]
fn test_keys_have_separate_buckets() {
    let clock = manual_clock();
    let limiter = TokenBucket::new(bucket(3, 1.0), clock).unwrap();

    for _ in 0..3 {
        assert!(limiter.decide("user1").allowed);
    }
    assert!(!limiter.decide("user1").allowed);

    let result = limiter.decide("user2");
    assert!(result.allowed, "Different user should be allowed");
    assert_eq!(result.remaining, 2);
    assert_eq!(limiter.tracked_keys(), 2);
}

#[test]
fn test_reset_refills_key() {
    let clock = manual_clock();
    let limiter = TokenBucket::new(bucket(2, 1.0), clock).unwrap();

    limiter.decide("user");
    limiter.decide("user");
    assert!(!limiter.decide("user").allowed);

    assert!(limiter.reset("user"));
    let result = limiter.decide("user");
    assert!(result.allowed);
    assert_eq!(result.remaining, 1);
}

#[test]
fn test_rejects_invalid_configuration() {
    let clock = manual_clock();
    for config in [bucket(0, 1.0), bucket(5, 0.0), bucket(5, -1.0), bucket(5, f64::INFINITY)] {
        let err = TokenBucket::new(config.clone(), clock.clone()).unwrap_err();
        assert!(
            matches!(err, RateLimiterError::InvalidConfiguration(_)),
            "{:?} should be rejected",
            config
        );
    }
}

/// Test concurrent access to the same bucket
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_never_overspend() {
    let clock = manual_clock();
    let limiter = Arc::new(TokenBucket::new(bucket(10, 1.0), clock).unwrap());

    let allowed = concurrent_allowed(Arc::clone(&limiter), "concurrent_user", 20).await;
    assert_eq!(allowed, 10, "Exactly capacity requests should be allowed");

    let after = limiter.decide("concurrent_user");
    assert!(!after.allowed, "Bucket should be empty after the burst");
}
