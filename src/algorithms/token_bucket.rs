// src/algorithms/token_bucket.rs

use std::sync::Arc;
use std::time::SystemTime;

use crate::algorithms::{Decision, RateLimitAlgorithm};
use crate::clock::{self, Clock};
use crate::config::{InMemoryConfig, TokenBucketConfig};
use crate::error::Result;
use crate::rate_limit_event;
use crate::storage::MemoryStore;

/// Token Bucket rate limiting algorithm
///
/// The token bucket algorithm works by maintaining a "bucket" of tokens that are
/// replenished at a constant rate. Each request consumes a token, and if there
/// are no tokens available, the request is rejected. Bursts up to the capacity
/// are allowed, after which requests flow at the refill rate.
#[derive(Debug)]
pub struct TokenBucket {
    config: TokenBucketConfig,
    clock: Arc<dyn Clock>,
    buckets: MemoryStore<BucketState>,
}

#[derive(Debug, Clone, Copy)]
struct BucketState {
    tokens: f64,
    last_refill: SystemTime,
}

impl TokenBucket {
    /// Creates a new token bucket with the default key store settings
    pub fn new(config: TokenBucketConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_memory(config, InMemoryConfig::default(), clock)
    }

    pub fn with_memory(
        config: TokenBucketConfig,
        memory: InMemoryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        // An idle bucket is full again after capacity / refill_rate seconds
        let horizon = clock::secs_to_duration(config.capacity as f64 / config.refill_rate);
        let buckets = MemoryStore::new(memory, horizon)?;
        Ok(Self {
            config,
            clock,
            buckets,
        })
    }

    pub fn config(&self) -> &TokenBucketConfig {
        &self.config
    }

    fn transition(&self, state: &mut BucketState, now: SystemTime) -> Decision {
        let capacity = self.config.capacity as f64;
        let rate = self.config.refill_rate;

        let elapsed = clock::elapsed_secs(state.last_refill, now);
        state.tokens = (state.tokens + elapsed * rate).min(capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Decision::allow(
                state.tokens.floor() as u64,
                self.config.capacity,
                clock::after(now, (capacity - state.tokens) / rate),
            )
        } else {
            Decision::deny(
                self.config.capacity,
                clock::after(now, (1.0 - state.tokens) / rate),
            )
        }
    }
}

impl RateLimitAlgorithm for TokenBucket {
    fn name(&self) -> &'static str {
        "token_bucket"
    }

    fn capacity(&self) -> u64 {
        self.config.capacity
    }

    fn decide(&self, key: &str) -> Decision {
        let now = self.clock.now();
        let full = BucketState {
            tokens: self.config.capacity as f64,
            last_refill: now,
        };
        let decision = self
            .buckets
            .with_state(key, now, || full, |state| self.transition(state, now));
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
