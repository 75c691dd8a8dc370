// src/clock.rs

//! Time sources for the limiter.
//!
//! Every engine, the Redis adapter and the health tracker read time through
//! [`Clock`] so that tests and simulations can drive time explicitly.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of wall-clock time
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> SystemTime;
}

/// The real system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to.
///
/// Stored as nanoseconds since the epoch in an atomic, so it can be shared
/// between threads without locking.
#[derive(Debug)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            nanos: AtomicU64::new(to_nanos(start)),
        }
    }

    /// A clock positioned `secs` seconds after the Unix epoch
    pub fn at_epoch_secs(secs: f64) -> Self {
        Self::new(after(UNIX_EPOCH, secs))
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(by, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance(secs_to_duration(secs));
    }

    pub fn set(&self, to: SystemTime) {
        self.nanos.store(to_nanos(to), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(SystemTime::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

fn to_nanos(time: SystemTime) -> u64 {
    let since = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    u64::try_from(since.as_nanos()).unwrap_or(u64::MAX)
}

/// Seconds since the Unix epoch as a float; instants before the epoch clamp to 0
pub fn epoch_secs(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Seconds elapsed between `earlier` and `now`; 0 if the clock went backwards
pub fn elapsed_secs(earlier: SystemTime, now: SystemTime) -> f64 {
    now.duration_since(earlier).unwrap_or_default().as_secs_f64()
}

/// Converts a non-negative float number of seconds into a `Duration`, saturating
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// `time + secs`, saturating instead of panicking on overflow
pub fn after(time: SystemTime, secs: f64) -> SystemTime {
    let offset = secs_to_duration(secs);
    time.checked_add(offset)
        .or_else(|| time.checked_add(Duration::from_secs(u32::MAX as u64)))
        .unwrap_or(time)
}
