// library entry
pub mod algorithms;
pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod resilience;
pub mod storage;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod tests;

// Re-export key components for convenience
pub use algorithms::{Decision, Engine, RateLimitAlgorithm};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{RateLimiterError, Result, StorageError};
pub use limiter::RateLimiter;
pub use logging::init as init_logging;
pub use resilience::{FailoverRouter, HealthTracker};
pub use storage::{RedisTokenBucket, RemoteStore};
