// src/resilience/health_tracker.rs

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::HealthConfig;

/// Whether the remote store may be tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Remote calls are attempted
    Available,
    /// Remote calls are skipped until a success or until the retry window passes
    Degraded,
}

/// Point-in-time view of the tracker, for health probes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub state: HealthState,
    pub failure_count: u64,
    pub success_count: u64,
    /// Epoch milliseconds of the most recent failure, if any
    pub last_failure_ms: Option<u64>,
}

/// Remote-store reachability tracker.
///
/// All state is atomic, so reads never block and nothing is held across a
/// remote call. A degraded tracker heals itself once `retry_window` has
/// passed since the last failure, which lets the router probe the remote
/// store again without a background task.
#[derive(Debug)]
pub struct HealthTracker {
    available: AtomicBool,
    /// Epoch millis of the last failure, 0 when none
    last_failure_ms: AtomicU64,
    failure_count: AtomicU64,
    success_count: AtomicU64,
    retry_window: Duration,
    clock: Arc<dyn Clock>,
}

impl HealthTracker {
    pub fn new(config: HealthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            available: AtomicBool::new(true),
            last_failure_ms: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            retry_window: config.retry_window,
            clock,
        }
    }

    pub fn retry_window(&self) -> Duration {
        self.retry_window
    }

    /// Records a failed remote call; the tracker becomes degraded
    pub fn mark_failure(&self) {
        self.last_failure_ms
            .store(epoch_millis(self.clock.now()), Ordering::SeqCst);
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;

        if self.available.swap(false, Ordering::SeqCst) {
            warn!(
                failure_count = failures,
                retry_window = ?self.retry_window,
                "Remote store marked unavailable"
            );
        }
    }

    /// Records a successful remote call; the tracker becomes available
    pub fn mark_success(&self) {
        self.success_count.fetch_add(1, Ordering::Relaxed);

        if !self.available.swap(true, Ordering::SeqCst) {
            info!("Remote store available again");
        }
    }

    /// True when the remote store should be attempted
    pub fn is_available(&self) -> bool {
        self.state() == HealthState::Available
    }

    pub fn state(&self) -> HealthState {
        if self.available.load(Ordering::SeqCst) || self.retry_window_elapsed() {
            HealthState::Available
        } else {
            HealthState::Degraded
        }
    }

    fn retry_window_elapsed(&self) -> bool {
        let last = self.last_failure_ms.load(Ordering::SeqCst);
        let now = epoch_millis(self.clock.now());
        now.saturating_sub(last) > self.retry_window.as_millis() as u64
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
    }

    pub fn last_failure(&self) -> Option<SystemTime> {
        match self.last_failure_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms)),
        }
    }

    /// Back to the initial state: available, no failures, counters at zero
    pub fn reset(&self) {
        self.available.store(true, Ordering::SeqCst);
        self.last_failure_ms.store(0, Ordering::SeqCst);
        self.failure_count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            state: self.state(),
            failure_count: self.failure_count(),
            success_count: self.success_count(),
            last_failure_ms: match self.last_failure_ms.load(Ordering::SeqCst) {
                0 => None,
                ms => Some(ms),
            },
        }
    }
}

fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
