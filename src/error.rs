// for error definitions
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateLimiterError {
    /// The remote store could not serve the decision (timeout, connection or protocol failure)
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(StorageError),

    /// Non-positive capacity, rate or window, or an unparsable setting
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Redis connection errors
    #[error("Redis connection error: {0}")]
    Connection(String),

    /// Redis command or script errors
    #[error("Redis command error: {0}")]
    Command(String),

    /// The round trip did not complete in time
    #[error("Redis operation timed out after {0:?}")]
    Timeout(Duration),

    /// Data serialization/deserialization errors
    #[error("Data serialization error: {0}")]
    Serialization(String),
}

impl RateLimiterError {
    pub fn config(msg: impl Into<String>) -> Self {
        RateLimiterError::InvalidConfiguration(msg.into())
    }

    pub fn is_remote_unavailable(&self) -> bool {
        matches!(self, RateLimiterError::RemoteUnavailable(_))
    }
}

impl From<StorageError> for RateLimiterError {
    fn from(err: StorageError) -> Self {
        RateLimiterError::RemoteUnavailable(err)
    }
}

// Every redis failure means the remote path cannot be trusted for this call
impl From<redis::RedisError> for RateLimiterError {
    fn from(err: redis::RedisError) -> Self {
        let storage = if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.kind() == redis::ErrorKind::AuthenticationFailed
            || err.kind() == redis::ErrorKind::ClientError
        {
            StorageError::Connection(err.to_string())
        } else if err.is_timeout() {
            StorageError::Command(format!("timeout: {}", err))
        } else {
            StorageError::Command(err.to_string())
        };
        RateLimiterError::RemoteUnavailable(storage)
    }
}

// implement conversions from serde_json::Error to RateLimiterError
impl From<serde_json::Error> for RateLimiterError {
    fn from(err: serde_json::Error) -> Self {
        RateLimiterError::RemoteUnavailable(StorageError::Serialization(err.to_string()))
    }
}

// define a Result type alias for convenience
pub type Result<T> = std::result::Result<T, RateLimiterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_error_is_remote_unavailable() {
        let err: RateLimiterError = serde_json::from_str::<u64>("not json").unwrap_err().into();
        assert!(err.is_remote_unavailable());
        assert!(matches!(
            err,
            RateLimiterError::RemoteUnavailable(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn test_io_error_maps_to_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: RateLimiterError = redis::RedisError::from(io).into();
        assert!(matches!(
            err,
            RateLimiterError::RemoteUnavailable(StorageError::Connection(_))
        ));
    }

    #[test]
    fn test_config_error_message() {
        let err = RateLimiterError::config("capacity must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: capacity must be positive"
        );
        assert!(!err.is_remote_unavailable());
    }
}
