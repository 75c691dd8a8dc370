// src/algorithms/sliding_window.rs

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;

use crate::algorithms::{Decision, RateLimitAlgorithm};
use crate::clock::Clock;
use crate::config::{InMemoryConfig, SlidingWindowConfig};
use crate::error::Result;
use crate::rate_limit_event;
use crate::storage::MemoryStore;

/// Sliding Window (log) rate limiting algorithm
///
/// Keeps the timestamp of every admitted request inside the trailing window,
/// so it never admits more than `capacity` requests in any interval of length
/// `window`. Memory per key grows with the number of recent requests.
#[derive(Debug)]
pub struct SlidingWindow {
    config: SlidingWindowConfig,
    clock: Arc<dyn Clock>,
    logs: MemoryStore<VecDeque<SystemTime>>,
}

impl SlidingWindow {
    /// Creates a new sliding window with the given configuration
    pub fn new(config: SlidingWindowConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_memory(config, InMemoryConfig::default(), clock)
    }

    pub fn with_memory(
        config: SlidingWindowConfig,
        memory: InMemoryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let logs = MemoryStore::new(memory, config.window)?;
        Ok(Self {
            config,
            clock,
            logs,
        })
    }

    pub fn config(&self) -> &SlidingWindowConfig {
        &self.config
    }

    fn expires_at(&self, stamp: SystemTime) -> SystemTime {
        stamp.checked_add(self.config.window).unwrap_or(stamp)
    }

    fn transition(&self, log: &mut VecDeque<SystemTime>, now: SystemTime) -> Decision {
        while let Some(&oldest) = log.front() {
            if self.expires_at(oldest) <= now {
                log.pop_front();
            } else {
                break;
            }
        }

        let count = log.len() as u64;
        if count < self.config.capacity {
            log.push_back(now);
            // The front is `now` itself when the log was empty
            let oldest = log.front().copied().unwrap_or(now);
            Decision::allow(
                self.config.capacity - (count + 1),
                self.config.capacity,
                self.expires_at(oldest),
            )
        } else {
            let oldest = log.front().copied().unwrap_or(now);
            Decision::deny(self.config.capacity, self.expires_at(oldest))
        }
    }
}

impl RateLimitAlgorithm for SlidingWindow {
    fn name(&self) -> &'static str {
        "sliding_window"
    }

    fn capacity(&self) -> u64 {
        self.config.capacity
    }

    fn decide(&self, key: &str) -> Decision {
        let now = self.clock.now();
        let decision = self
            .logs
            .with_state(key, now, VecDeque::new, |log| self.transition(log, now));
        rate_limit_event!(self.name(), key, decision);
        decision
    }

    fn reset(&self, key: &str) -> bool {
        self.logs.remove(key)
    }

    fn tracked_keys(&self) -> usize {
        self.logs.len()
    }

    fn purge_idle(&self) -> usize {
        self.logs.purge_idle(self.clock.now())
    }
}
