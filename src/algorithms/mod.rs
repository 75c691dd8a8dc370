// src/algorithms/mod.rs

pub mod fixed_window;
pub mod leaky_bucket;
pub mod sliding_window;
pub mod token_bucket;

#[cfg(test)]
mod tests;

pub use fixed_window::FixedWindow;
pub use leaky_bucket::LeakyBucket;
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;

use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::clock::Clock;
use super::config::{AlgorithmConfig, InMemoryConfig};
use super::error::Result;

/// Outcome of one rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    /// Whether the request was allowed
    pub allowed: bool,

    /// Budget left right after this decision; always 0 when denied
    pub remaining: u64,

    /// Total capacity of the rate limiter
    pub limit: u64,

    /// Earliest instant at which budget is expected to increase
    pub reset_at: SystemTime,
}

impl Decision {
    pub fn allow(remaining: u64, limit: u64, reset_at: SystemTime) -> Self {
        Self {
            allowed: true,
            remaining: remaining.min(limit),
            limit,
            reset_at,
        }
    }

    pub fn deny(limit: u64, reset_at: SystemTime) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            limit,
            reset_at,
        }
    }

    /// Time left until `reset_at`, zero if it already passed
    pub fn reset_after(&self, now: SystemTime) -> Duration {
        self.reset_at.duration_since(now).unwrap_or_default()
    }

    /// `reset_at` rounded up to whole epoch seconds, as used in rate limit headers
    pub fn reset_epoch_secs(&self) -> u64 {
        let since = self.reset_at.duration_since(UNIX_EPOCH).unwrap_or_default();
        if since.subsec_nanos() > 0 {
            since.as_secs() + 1
        } else {
            since.as_secs()
        }
    }
}

/// Core trait that all local rate limiting algorithms implement.
///
/// Decisions are synchronous, in-memory and never fail.
pub trait RateLimitAlgorithm: Send + Sync + Debug {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Maximum budget per key
    fn capacity(&self) -> u64;

    /// Checks the budget of `key` and consumes one unit if available
    fn decide(&self, key: &str) -> Decision;

    /// Forgets everything about `key`; returns whether state existed
    fn reset(&self, key: &str) -> bool;

    /// Number of keys currently holding state
    fn tracked_keys(&self) -> usize;

    /// Drops keys idle long enough to be indistinguishable from fresh ones
    fn purge_idle(&self) -> usize;
}

impl<A: RateLimitAlgorithm + ?Sized> RateLimitAlgorithm for Arc<A> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn capacity(&self) -> u64 {
        (**self).capacity()
    }

    fn decide(&self, key: &str) -> Decision {
        (**self).decide(key)
    }

    fn reset(&self, key: &str) -> bool {
        (**self).reset(key)
    }

    fn tracked_keys(&self) -> usize {
        (**self).tracked_keys()
    }

    fn purge_idle(&self) -> usize {
        (**self).purge_idle()
    }
}

/// One of the four local engines, selected at runtime
#[derive(Debug)]
pub enum Engine {
    FixedWindow(FixedWindow),
    SlidingWindow(SlidingWindow),
    LeakyBucket(LeakyBucket),
    TokenBucket(TokenBucket),
}

impl Engine {
    pub fn new(config: &AlgorithmConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_memory(config, InMemoryConfig::default(), clock)
    }

    pub fn with_memory(
        config: &AlgorithmConfig,
        memory: InMemoryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let engine = match config {
            AlgorithmConfig::FixedWindow(c) => {
                Engine::FixedWindow(FixedWindow::with_memory(c.clone(), memory, clock)?)
            }
            AlgorithmConfig::SlidingWindow(c) => {
                Engine::SlidingWindow(SlidingWindow::with_memory(c.clone(), memory, clock)?)
            }
            AlgorithmConfig::LeakyBucket(c) => {
                Engine::LeakyBucket(LeakyBucket::with_memory(c.clone(), memory, clock)?)
            }
            AlgorithmConfig::TokenBucket(c) => {
                Engine::TokenBucket(TokenBucket::with_memory(c.clone(), memory, clock)?)
            }
        };
        Ok(engine)
    }

    fn inner(&self) -> &dyn RateLimitAlgorithm {
        match self {
            Engine::FixedWindow(e) => e,
            Engine::SlidingWindow(e) => e,
            Engine::LeakyBucket(e) => e,
            Engine::TokenBucket(e) => e,
        }
    }
}

impl RateLimitAlgorithm for Engine {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn capacity(&self) -> u64 {
        self.inner().capacity()
    }

    fn decide(&self, key: &str) -> Decision {
        self.inner().decide(key)
    }

    fn reset(&self, key: &str) -> bool {
        self.inner().reset(key)
    }

    fn tracked_keys(&self) -> usize {
        self.inner().tracked_keys()
    }

    fn purge_idle(&self) -> usize {
        self.inner().purge_idle()
    }
}
