// src/limiter.rs

use std::sync::Arc;
use tracing::info;

use crate::algorithms::{Decision, Engine, RateLimitAlgorithm};
use crate::clock::Clock;
use crate::config::{AlgorithmConfig, LimiterConfig};
use crate::error::{RateLimiterError, Result};
use crate::resilience::{FailoverRouter, HealthSnapshot, HealthTracker};
use crate::storage::RedisTokenBucket;

/// A limiter built from configuration: purely local, or Redis-backed with local failover
#[derive(Debug)]
pub enum RateLimiter {
    Local(Engine),
    Failover(FailoverRouter<RedisTokenBucket, Engine>),
}

impl RateLimiter {
    pub fn from_config(config: &LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let engine = Engine::with_memory(&config.algorithm, config.memory.clone(), clock.clone())?;

        let Some(redis) = &config.redis else {
            info!(algorithm = engine.name(), "Rate limiter running in local mode");
            return Ok(RateLimiter::Local(engine));
        };

        // Only the token bucket has a distributed implementation
        let AlgorithmConfig::TokenBucket(bucket) = &config.algorithm else {
            return Err(RateLimiterError::config(format!(
                "remote store requires the token_bucket algorithm, got {}",
                config.algorithm.name()
            )));
        };

        let remote = RedisTokenBucket::new(redis.clone(), bucket.clone(), clock.clone())?;
        let health = Arc::new(HealthTracker::new(config.health.clone(), clock));
        info!(
            url = %redis.url,
            key_prefix = %redis.key_prefix,
            "Rate limiter running with Redis and local failover"
        );
        Ok(RateLimiter::Failover(FailoverRouter::new(
            remote, engine, health,
        )))
    }

    pub async fn decide(&self, key: &str) -> Decision {
        match self {
            RateLimiter::Local(engine) => engine.decide(key),
            RateLimiter::Failover(router) => router.decide(key).await,
        }
    }

    pub fn algorithm(&self) -> &'static str {
        self.engine().name()
    }

    pub fn capacity(&self) -> u64 {
        self.engine().capacity()
    }

    /// The local engine, also the fallback in failover mode
    pub fn engine(&self) -> &Engine {
        match self {
            RateLimiter::Local(engine) => engine,
            RateLimiter::Failover(router) => router.local(),
        }
    }

    /// Remote-store health; `None` in local mode
    pub fn health(&self) -> Option<HealthSnapshot> {
        match self {
            RateLimiter::Local(_) => None,
            RateLimiter::Failover(router) => Some(router.health().snapshot()),
        }
    }
}
