// src/storage/memory.rs

// In-memory per-key state for the local engines.
// Each engine owns one MemoryStore; the DashMap shard lock held during a
// transition gives per-key mutual exclusion.
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::config::InMemoryConfig;
use crate::error::Result;

/// Entry in the in-memory storage
#[derive(Debug)]
struct Slot<S> {
    state: S,
    last_seen: SystemTime,
}

/// Concurrent per-key state map with idle eviction and a soft size bound
#[derive(Debug)]
pub struct MemoryStore<S> {
    entries: DashMap<String, Slot<S>>,
    config: InMemoryConfig,
    /// Entries untouched for this long are dropped
    idle_timeout: Duration,
    /// Epoch millis of the last sweep
    last_sweep: AtomicU64,
    /// Epoch millis of the last over-capacity warning, 0 when none
    last_full_warning: AtomicU64,
}

impl<S> MemoryStore<S> {
    /// Creates a store whose entries expire after `idle_multiplier × horizon` of inactivity.
    ///
    /// `horizon` must be the time after which an untouched key's state is
    /// equivalent to a fresh key's state, so eviction never alters a decision.
    pub fn new(config: InMemoryConfig, horizon: Duration) -> Result<Self> {
        config.validate()?;
        let idle_timeout = horizon
            .checked_mul(config.idle_multiplier)
            .unwrap_or(Duration::MAX);

        Ok(Self {
            entries: DashMap::with_capacity(config.max_entries.min(10_000)),
            config,
            idle_timeout,
            last_sweep: AtomicU64::new(0),
            last_full_warning: AtomicU64::new(0),
        })
    }

    /// Runs `transition` on the state of `key`, creating it with `init` on first sight.
    ///
    /// No other transition on the same key can run concurrently.
    pub fn with_state<R>(
        &self,
        key: &str,
        now: SystemTime,
        init: impl FnOnce() -> S,
        transition: impl FnOnce(&mut S) -> R,
    ) -> R {
        self.maybe_sweep(now);

        if let Some(mut slot) = self.entries.get_mut(key) {
            slot.last_seen = now;
            return transition(&mut slot.state);
        }

        self.note_full(key, now);

        let mut slot = self.entries.entry(key.to_owned()).or_insert_with(|| Slot {
            state: init(),
            last_seen: now,
        });
        slot.last_seen = now;
        transition(&mut slot.state)
    }

    /// Drops the state for `key`, returning whether it existed
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Removes every entry idle for at least the idle timeout; returns how many were dropped
    pub fn purge_idle(&self, now: SystemTime) -> usize {
        let before = self.entries.len();
        let idle_timeout = self.idle_timeout;
        self.entries
            .retain(|_, slot| now.duration_since(slot.last_seen).unwrap_or_default() < idle_timeout);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "Purged idle keys");
        }
        removed
    }

    /// Sweeps at most once per sweep interval, driven by decisions rather than a timer
    fn maybe_sweep(&self, now: SystemTime) {
        let now_ms = millis(now);
        let last = self.last_sweep.load(Ordering::Relaxed);
        let interval_ms = self.config.sweep_interval.as_millis() as u64;
        if now_ms.saturating_sub(last) < interval_ms {
            return;
        }
        // Only the caller that wins the swap sweeps
        if self
            .last_sweep
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.purge_idle(now);
        }
    }

    /// Reports a full store; live keys are never evicted, so the bound is soft
    fn note_full(&self, key: &str, now: SystemTime) {
        if self.entries.len() < self.config.max_entries || self.entries.contains_key(key) {
            return;
        }

        // Warn at most once per sweep interval
        let now_ms = millis(now);
        let last = self.last_full_warning.load(Ordering::Relaxed);
        let interval_ms = self.config.sweep_interval.as_millis() as u64;
        if last != 0 && now_ms.saturating_sub(last) < interval_ms {
            return;
        }
        if self
            .last_full_warning
            .compare_exchange(last, now_ms.max(1), Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            warn!(
                tracked = self.entries.len(),
                max_entries = self.config.max_entries,
                "Key store over max_entries, keeping live keys until they go idle"
            );
        }
    }
}

fn millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
