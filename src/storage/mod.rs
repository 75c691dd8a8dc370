// src/storage/mod.rs

pub mod memory;
pub mod redis;

#[cfg(test)]
mod tests;

pub use memory::MemoryStore;
pub use redis::{BucketRecord, RedisTokenBucket};

use super::algorithms::Decision;
use super::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// A rate limiter whose state lives in a shared external store.
///
/// Implementations fail only with `RateLimiterError::RemoteUnavailable` and
/// never leave a half-applied transition behind.
#[async_trait]
pub trait RemoteStore: Send + Sync + Debug {
    /// Applies one decision for `key` atomically in the remote store
    async fn decide(&self, key: &str) -> Result<Decision>;
}
