// src/config/mod.rs

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RateLimiterError, Result};

/// Configuration for token bucket algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBucketConfig {
    /// Capacity of the token bucket (maximum burst)
    pub capacity: u64,

    /// Rate at which tokens are refilled (tokens per second)
    pub refill_rate: f64,
}

impl TokenBucketConfig {
    pub fn validate(&self) -> Result<()> {
        check_capacity(self.capacity)?;
        check_rate("refill_rate", self.refill_rate)
    }
}

/// Configuration for leaky bucket algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakyBucketConfig {
    /// Maximum fill level of the bucket
    pub capacity: u64,

    /// Units drained per second
    pub drain_rate: f64,
}

impl LeakyBucketConfig {
    pub fn validate(&self) -> Result<()> {
        check_capacity(self.capacity)?;
        check_rate("drain_rate", self.drain_rate)
    }
}

/// Configuration for fixed window algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedWindowConfig {
    /// Maximum number of requests allowed in the window
    pub capacity: u64,

    /// Window duration
    #[serde(with = "duration_serde")]
    pub window: Duration,
}

impl FixedWindowConfig {
    pub fn validate(&self) -> Result<()> {
        check_capacity(self.capacity)?;
        check_window(self.window)
    }
}

/// Configuration for sliding window log algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    /// Maximum number of requests allowed in any trailing window
    pub capacity: u64,

    /// Window duration
    #[serde(with = "duration_serde")]
    pub window: Duration,
}

impl SlidingWindowConfig {
    pub fn validate(&self) -> Result<()> {
        check_capacity(self.capacity)?;
        check_window(self.window)
    }
}

/// Selects one of the four engines together with its settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    FixedWindow(FixedWindowConfig),
    SlidingWindow(SlidingWindowConfig),
    LeakyBucket(LeakyBucketConfig),
    TokenBucket(TokenBucketConfig),
}

impl AlgorithmConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            AlgorithmConfig::FixedWindow(c) => c.validate(),
            AlgorithmConfig::SlidingWindow(c) => c.validate(),
            AlgorithmConfig::LeakyBucket(c) => c.validate(),
            AlgorithmConfig::TokenBucket(c) => c.validate(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmConfig::FixedWindow(_) => "fixed_window",
            AlgorithmConfig::SlidingWindow(_) => "sliding_window",
            AlgorithmConfig::LeakyBucket(_) => "leaky_bucket",
            AlgorithmConfig::TokenBucket(_) => "token_bucket",
        }
    }

    /// Builds a config from the flat knobs exposed on the command line and in the environment.
    ///
    /// `rate` feeds the bucket algorithms, `window` the window algorithms.
    pub fn from_parts(kind: &str, capacity: u64, rate: f64, window: Duration) -> Result<Self> {
        let config = match kind {
            "fixed_window" => AlgorithmConfig::FixedWindow(FixedWindowConfig { capacity, window }),
            "sliding_window" => {
                AlgorithmConfig::SlidingWindow(SlidingWindowConfig { capacity, window })
            }
            "leaky_bucket" => AlgorithmConfig::LeakyBucket(LeakyBucketConfig {
                capacity,
                drain_rate: rate,
            }),
            "token_bucket" => AlgorithmConfig::TokenBucket(TokenBucketConfig {
                capacity,
                refill_rate: rate,
            }),
            other => {
                return Err(RateLimiterError::config(format!(
                    "unknown algorithm '{}'",
                    other
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        AlgorithmConfig::TokenBucket(TokenBucketConfig {
            capacity: 100,
            refill_rate: 10.0,
        })
    }
}

/// Configuration for Redis storage backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Prefix prepended to every caller key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Upper bound for one whole remote decision, connection included
    #[serde(default = "default_command_timeout", with = "duration_serde")]
    pub command_timeout: Duration,

    /// Connection timeout
    #[serde(default = "default_conn_timeout", with = "duration_serde")]
    pub connection_timeout: Duration,

    /// Expiry applied to bucket records; records never expire when unset
    #[serde(default, with = "optional_duration_serde")]
    pub key_ttl: Option<Duration>,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: default_key_prefix(),
            command_timeout: default_command_timeout(),
            connection_timeout: default_conn_timeout(),
            key_ttl: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(RateLimiterError::config("redis url must not be empty"));
        }
        if self.command_timeout.is_zero() {
            return Err(RateLimiterError::config(
                "redis command_timeout must be positive",
            ));
        }
        if matches!(self.key_ttl, Some(ttl) if ttl.as_millis() == 0) {
            return Err(RateLimiterError::config(
                "redis key_ttl must be at least one millisecond",
            ));
        }
        Ok(())
    }
}

fn default_key_prefix() -> String {
    "ratelimit".to_string()
}

fn default_command_timeout() -> Duration {
    Duration::from_millis(500)
}

fn default_conn_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Configuration for the per-engine in-memory key store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InMemoryConfig {
    /// Maximum number of keys tracked by one engine
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Keys untouched for this many horizons are evicted
    #[serde(default = "default_idle_multiplier")]
    pub idle_multiplier: u32,

    /// How often a decision may trigger a sweep of idle keys
    #[serde(default = "default_sweep_interval", with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl InMemoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(RateLimiterError::config("max_entries must be positive"));
        }
        if self.idle_multiplier == 0 {
            return Err(RateLimiterError::config(
                "idle_multiplier must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            idle_multiplier: default_idle_multiplier(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

fn default_max_entries() -> usize {
    10_000
}

fn default_idle_multiplier() -> u32 {
    2
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

/// Configuration for the remote-store health tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// After this long without a new failure the remote store is probed again
    #[serde(default = "default_retry_window", with = "duration_serde")]
    pub retry_window: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            retry_window: default_retry_window(),
        }
    }
}

fn default_retry_window() -> Duration {
    Duration::from_secs(5)
}

/// Everything needed to build a [`crate::RateLimiter`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    pub algorithm: AlgorithmConfig,

    #[serde(default)]
    pub memory: InMemoryConfig,

    #[serde(default)]
    pub health: HealthConfig,

    /// Remote store; the limiter is purely local when absent
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

impl LimiterConfig {
    pub fn validate(&self) -> Result<()> {
        self.algorithm.validate()?;
        self.memory.validate()?;
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }
        Ok(())
    }

    /// Reads the configuration from the process environment.
    ///
    /// Recognised variables: RATE_LIMIT_ALGORITHM, RATE_LIMIT_CAPACITY,
    /// RATE_LIMIT_RATE, RATE_LIMIT_WINDOW_MS, REDIS_URL, REDIS_KEY_PREFIX,
    /// REDIS_TIMEOUT_MS, HEALTH_RETRY_WINDOW_MS.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`LimiterConfig::from_env`] with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let kind = lookup("RATE_LIMIT_ALGORITHM").unwrap_or_else(|| "token_bucket".to_string());
        let capacity = parse_var(&lookup, "RATE_LIMIT_CAPACITY", 100u64)?;
        let rate = parse_var(&lookup, "RATE_LIMIT_RATE", 10.0f64)?;
        let window_ms = parse_var(&lookup, "RATE_LIMIT_WINDOW_MS", 60_000u64)?;
        let algorithm =
            AlgorithmConfig::from_parts(&kind, capacity, rate, Duration::from_millis(window_ms))?;

        let redis = match lookup("REDIS_URL").filter(|url| !url.trim().is_empty()) {
            Some(url) => {
                let mut redis = RedisConfig::new(url);
                if let Some(prefix) = lookup("REDIS_KEY_PREFIX") {
                    redis.key_prefix = prefix;
                }
                let timeout_ms = parse_var(
                    &lookup,
                    "REDIS_TIMEOUT_MS",
                    default_command_timeout().as_millis() as u64,
                )?;
                redis.command_timeout = Duration::from_millis(timeout_ms);
                Some(redis)
            }
            None => None,
        };

        let retry_ms = parse_var(
            &lookup,
            "HEALTH_RETRY_WINDOW_MS",
            default_retry_window().as_millis() as u64,
        )?;

        let config = Self {
            algorithm,
            memory: InMemoryConfig::default(),
            health: HealthConfig {
                retry_window: Duration::from_millis(retry_ms),
            },
            redis,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            RateLimiterError::config(format!("{} has invalid value '{}': {}", name, raw, e))
        }),
        None => Ok(default),
    }
}

fn check_capacity(capacity: u64) -> Result<()> {
    if capacity == 0 {
        return Err(RateLimiterError::config("capacity must be positive"));
    }
    Ok(())
}

fn check_rate(name: &str, rate: f64) -> Result<()> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(RateLimiterError::config(format!(
            "{} must be a positive finite number, got {}",
            name, rate
        )));
    }
    Ok(())
}

fn check_window(window: Duration) -> Result<()> {
    if window.is_zero() {
        return Err(RateLimiterError::config("window must be positive"));
    }
    Ok(())
}

// Helper module to serialize/deserialize Duration with serde
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
