// src/test_utils.rs

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::algorithms::{Decision, RateLimitAlgorithm, TokenBucket};
use super::clock::{Clock, ManualClock};
use super::config::{HealthConfig, TokenBucketConfig};
use super::error::{RateLimiterError, Result, StorageError};
use super::resilience::HealthTracker;
use super::storage::RemoteStore;

/// Start of every test timeline, far from the epoch so offsets never underflow
pub const T0: f64 = 1_700_000_000.0;

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::at_epoch_secs(T0))
}

pub fn tracker(clock: Arc<ManualClock>, retry_window: Duration) -> Arc<HealthTracker> {
    Arc::new(HealthTracker::new(HealthConfig { retry_window }, clock))
}

/// Remote store double backed by an in-process token bucket.
///
/// Can be switched into a failing mode, and counts every call it receives.
#[derive(Debug)]
pub struct MockRemote {
    bucket: TokenBucket,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MockRemote {
    pub fn new(config: TokenBucketConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            bucket: TokenBucket::new(config, clock).unwrap(),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(config: TokenBucketConfig, clock: Arc<dyn Clock>) -> Self {
        let remote = Self::new(config, clock);
        remote.set_failing(true);
        remote
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn decide(&self, key: &str) -> Result<Decision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RateLimiterError::RemoteUnavailable(
                StorageError::Connection("Simulated failure".to_string()),
            ));
        }
        Ok(self.bucket.decide(key))
    }
}

/// Fires `count` decisions for `key` at once and returns how many were allowed
pub async fn concurrent_allowed<A>(engine: Arc<A>, key: &str, count: usize) -> usize
where
    A: RateLimitAlgorithm + 'static,
{
    let barrier = Arc::new(tokio::sync::Barrier::new(count));
    let mut handles = Vec::with_capacity(count);

    for _ in 0..count {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        let key = key.to_string();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            engine.decide(&key)
        }));
    }

    futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|d| d.allowed)
        .count()
}

/// Asserts the invariants every decision must satisfy
pub fn assert_well_formed(decision: &Decision) {
    assert!(
        decision.remaining <= decision.limit,
        "remaining {} exceeds limit {}",
        decision.remaining,
        decision.limit
    );
    if !decision.allowed {
        assert_eq!(decision.remaining, 0, "denied decisions have no budget left");
    }
}
