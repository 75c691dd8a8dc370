// src/storage/redis.rs

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::sync::OnceCell;
use tokio::time;
use tracing::{debug, warn};

use crate::algorithms::Decision;
use crate::clock::{self, Clock};
use crate::config::{RedisConfig, TokenBucketConfig};
use crate::error::{RateLimiterError, Result, StorageError};
use crate::storage::RemoteStore;
use crate::{rate_limit_event, storage_op};

/// Refill, compare and consume in one server-side step.
///
/// KEYS[1] record key; ARGV: capacity, refill rate (tokens/s), now (epoch
/// seconds), ttl in milliseconds (0 = never expire).
const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local ttl_ms = tonumber(ARGV[4])

local tokens = capacity
local last_refill = now

local raw = redis.call('GET', key)
if raw then
  local ok, record = pcall(cjson.decode, raw)
  if ok and type(record) == 'table' then
    tokens = tonumber(record.tokens) or capacity
    last_refill = tonumber(record.last_refill_time) or now
  end
end

local elapsed = math.max(0, now - last_refill)
tokens = math.min(capacity, tokens + elapsed * refill_rate)

local allowed = false
local reset_in
if tokens >= 1 then
  tokens = tokens - 1
  allowed = true
  reset_in = (capacity - tokens) / refill_rate
else
  reset_in = (1 - tokens) / refill_rate
end

local encoded = cjson.encode({ tokens = tokens, last_refill_time = math.max(now, last_refill) })
if ttl_ms > 0 then
  redis.call('SET', key, encoded, 'PX', ttl_ms)
else
  redis.call('SET', key, encoded)
end

return cjson.encode({ allowed = allowed, tokens = tokens, reset_in = reset_in })
"#;

/// The per-key record stored in Redis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketRecord {
    pub tokens: f64,
    /// Epoch seconds
    pub last_refill_time: f64,
}

/// What the script hands back after a transition
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct ScriptReply {
    pub allowed: bool,
    pub tokens: f64,
    pub reset_in: f64,
}

impl ScriptReply {
    pub(crate) fn into_decision(self, capacity: u64, now: SystemTime) -> Decision {
        let reset_at = clock::after(now, self.reset_in);
        if self.allowed {
            let remaining = self.tokens.floor().clamp(0.0, capacity as f64) as u64;
            Decision::allow(remaining, capacity, reset_at)
        } else {
            Decision::deny(capacity, reset_at)
        }
    }
}

/// Token bucket whose state is shared by every process talking to the same Redis
pub struct RedisTokenBucket {
    client: Client,
    /// Established on first use so the process can start while Redis is down
    connection: OnceCell<ConnectionManager>,
    script: Script,
    config: RedisConfig,
    bucket: TokenBucketConfig,
    clock: Arc<dyn Clock>,
}

// Manually implement Debug
impl fmt::Debug for RedisTokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisTokenBucket")
            .field("url", &self.config.url)
            .field("key_prefix", &self.config.key_prefix)
            .field("capacity", &self.bucket.capacity)
            .field("refill_rate", &self.bucket.refill_rate)
            .field("connected", &self.connection.initialized())
            .finish()
    }
}

impl RedisTokenBucket {
    /// Creates the adapter; no connection is attempted until the first call
    pub fn new(
        config: RedisConfig,
        bucket: TokenBucketConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        bucket.validate()?;

        // Open the client - this doesn't actually connect to Redis yet
        let client = Client::open(config.url.as_str()).map_err(|e| {
            RateLimiterError::config(format!("invalid redis url '{}': {}", config.url, e))
        })?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
            script: Script::new(TOKEN_BUCKET_SCRIPT),
            config,
            bucket,
            clock,
        })
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    pub fn capacity(&self) -> u64 {
        self.bucket.capacity
    }

    /// The Redis key holding the record for a caller key
    pub fn record_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                let connect = ConnectionManager::new(self.client.clone());
                match time::timeout(self.config.connection_timeout, connect).await {
                    Ok(Ok(manager)) => {
                        debug!(url = %self.config.url, "Connected to Redis");
                        Ok(manager)
                    }
                    Ok(Err(e)) => Err(RateLimiterError::from(e)),
                    Err(_) => {
                        warn!(
                            url = %self.config.url,
                            timeout = ?self.config.connection_timeout,
                            "Connection to Redis timed out"
                        );
                        Err(RateLimiterError::from(StorageError::Timeout(
                            self.config.connection_timeout,
                        )))
                    }
                }
            })
            .await?;

        Ok(manager.clone())
    }

    /// Runs `op` under the command timeout
    async fn bounded<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match time::timeout(self.config.command_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(self.config.command_timeout).into()),
        }
    }

    async fn run_script(&self, record_key: &str, now: SystemTime) -> Result<ScriptReply> {
        let mut conn = self.connection().await?;
        let ttl_ms = self
            .config
            .key_ttl
            .map(|ttl| ttl.as_millis() as u64)
            .unwrap_or(0);

        let raw: String = self
            .script
            .key(record_key)
            .arg(self.bucket.capacity)
            .arg(self.bucket.refill_rate)
            .arg(clock::epoch_secs(now))
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;

        Ok(serde_json::from_str(&raw)?)
    }

    /// Ping Redis to check health with timeout
    pub async fn ping(&self) -> Result<()> {
        let result = self
            .bounded(async {
                let mut conn = self.connection().await?;
                let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok::<_, RateLimiterError>(pong)
            })
            .await?;

        if result == "PONG" {
            Ok(())
        } else {
            Err(StorageError::Command(format!(
                "Unexpected response from Redis PING: {}",
                result
            ))
            .into())
        }
    }

    /// Reads the stored record for `key` without changing it
    pub async fn inspect(&self, key: &str) -> Result<Option<BucketRecord>> {
        let record_key = self.record_key(key);
        let raw: Option<String> = self
            .bounded(async {
                let mut conn = self.connection().await?;
                let value: Option<String> = conn.get(&record_key).await?;
                Ok::<_, RateLimiterError>(value)
            })
            .await?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RemoteStore for RedisTokenBucket {
    async fn decide(&self, key: &str) -> Result<Decision> {
        let started = Instant::now();
        let now = self.clock.now();
        let record_key = self.record_key(key);

        let result = self.bounded(self.run_script(&record_key, now)).await;
        storage_op!(
            "token_bucket_script",
            key,
            result,
            started.elapsed().as_millis() as u64
        );

        let decision = result?.into_decision(self.bucket.capacity, now);
        rate_limit_event!("redis_token_bucket", key, decision);
        Ok(decision)
    }
}
