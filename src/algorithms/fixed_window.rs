// src/algorithms/fixed_window.rs

use std::sync::Arc;
use std::time::SystemTime;

use super::super::algorithms::{Decision, RateLimitAlgorithm};
use super::super::clock::Clock;
use super::super::config::{FixedWindowConfig, InMemoryConfig};
use super::super::error::Result;
use super::super::storage::MemoryStore;
use crate::rate_limit_event;

/// Fixed Window rate limiting algorithm
///
/// Each key gets a window that opens with its first request and lasts
/// `window`; at most `capacity` requests are admitted per window. When the
/// window ends, the counter resets. Up to twice the capacity can pass around a
/// window boundary.
#[derive(Debug)]
pub struct FixedWindow {
    config: FixedWindowConfig,
    clock: Arc<dyn Clock>,
    counters: MemoryStore<WindowCounter>,
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u64,
    window_start: SystemTime,
}

impl FixedWindow {
    /// Creates a new fixed window with the given configuration
    pub fn new(config: FixedWindowConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_memory(config, InMemoryConfig::default(), clock)
    }

    pub fn with_memory(
        config: FixedWindowConfig,
        memory: InMemoryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let counters = MemoryStore::new(memory, config.window)?;
        Ok(Self {
            config,
            clock,
            counters,
        })
    }

    pub fn config(&self) -> &FixedWindowConfig {
        &self.config
    }

    fn transition(&self, counter: &mut WindowCounter, now: SystemTime) -> Decision {
        let window_end = |start: SystemTime| start.checked_add(self.config.window).unwrap_or(start);

        if now >= window_end(counter.window_start) {
            counter.count = 0;
            counter.window_start = now;
        }

        let reset_at = window_end(counter.window_start);
        if counter.count < self.config.capacity {
            counter.count += 1;
            Decision::allow(
                self.config.capacity - counter.count,
                self.config.capacity,
                reset_at,
            )
        } else {
            Decision::deny(self.config.capacity, reset_at)
        }
    }
}

impl RateLimitAlgorithm for FixedWindow {
    fn name(&self) -> &'static str {
        "fixed_window"
    }

    fn capacity(&self) -> u64 {
        self.config.capacity
    }

    fn decide(&self, key: &str) -> Decision {
        let now = self.clock.now();
        let fresh = WindowCounter {
            count: 0,
            window_start: now,
        };
        let decision = self
            .counters
            .with_state(key, now, || fresh, |counter| self.transition(counter, now));
        rate_limit_event!(self.name(), key, decision);
        decision
    }

    fn reset(&self, key: &str) -> bool {
        self.counters.remove(key)
    }

    fn tracked_keys(&self) -> usize {
        self.counters.len()
    }

    fn purge_idle(&self) -> usize {
        self.counters.purge_idle(self.clock.now())
    }
}
