// src/algorithms/leaky_bucket.rs

use std::sync::Arc;
use std::time::SystemTime;

use crate::algorithms::{Decision, RateLimitAlgorithm};
use crate::clock::{self, Clock};
use crate::config::{InMemoryConfig, LeakyBucketConfig};
use crate::error::Result;
use crate::rate_limit_event;
use crate::storage::MemoryStore;

/// Leaky Bucket rate limiting algorithm
///
/// Every admitted request adds one unit to the bucket, which drains at a
/// constant rate. A request is admitted only while a whole unit still fits,
/// so traffic leaves at the drain rate with no burst allowance.
#[derive(Debug)]
pub struct LeakyBucket {
    config: LeakyBucketConfig,
    clock: Arc<dyn Clock>,
    buckets: MemoryStore<LevelState>,
}

#[derive(Debug, Clone, Copy)]
struct LevelState {
    level: f64,
    last_drain: SystemTime,
}

impl LeakyBucket {
    pub fn new(config: LeakyBucketConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_memory(config, InMemoryConfig::default(), clock)
    }

    pub fn with_memory(
        config: LeakyBucketConfig,
        memory: InMemoryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        // A full bucket is empty again after capacity / drain_rate seconds
        let horizon = clock::secs_to_duration(config.capacity as f64 / config.drain_rate);
        let buckets = MemoryStore::new(memory, horizon)?;
        Ok(Self {
            config,
            clock,
            buckets,
        })
    }

    pub fn config(&self) -> &LeakyBucketConfig {
        &self.config
    }

    fn transition(&self, state: &mut LevelState, now: SystemTime) -> Decision {
        let capacity = self.config.capacity as f64;
        let rate = self.config.drain_rate;

        let elapsed = clock::elapsed_secs(state.last_drain, now);
        state.level = (state.level - elapsed * rate).max(0.0);
        state.last_drain = now;

        if state.level + 1.0 <= capacity {
            state.level += 1.0;
            Decision::allow(
                (capacity - state.level).floor() as u64,
                self.config.capacity,
                clock::after(now, state.level / rate),
            )
        } else {
            Decision::deny(
                self.config.capacity,
                clock::after(now, (state.level - capacity + 1.0) / rate),
            )
        }
    }
}

impl RateLimitAlgorithm for LeakyBucket {
    fn name(&self) -> &'static str {
        "leaky_bucket"
    }

    fn capacity(&self) -> u64 {
        self.config.capacity
    }

    fn decide(&self, key: &str) -> Decision {
        let now = self.clock.now();
        let empty = LevelState {
            level: 0.0,
            last_drain: now,
        };
        let decision = self
            .buckets
            .with_state(key, now, || empty, |state| self.transition(state, now));
        rate_limit_event!(self.name(), key, decision);
        decision
    }

    fn reset(&self, key: &str) -> bool {
        self.buckets.remove(key)
    }

    fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    fn purge_idle(&self) -> usize {
        self.buckets.purge_idle(self.clock.now())
    }
}
