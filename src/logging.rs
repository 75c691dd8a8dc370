use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Ensure initialization happens only once
static INIT: Once = Once::new();

/// Initialize the logging system with sensible defaults.
///
/// Log level can be set using the RUST_LOG environment variable.
/// Example: RUST_LOG=debug,failover_limiter=trace
pub fn init() {
    init_with_default("info");
}

/// Same as [`init`], but with a caller-chosen filter when RUST_LOG is unset
pub fn init_with_default(default_filter: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));

        // try_init: a test harness may already have installed a subscriber
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true) // Useful for debugging concurrency issues
                    .with_line_number(true),
            )
            .try_init();

        if installed.is_ok() {
            tracing::info!("Logging initialized");
        }
    });
}

/// Macro for logging one rate limiting decision
#[macro_export]
macro_rules! rate_limit_event {
    ($algorithm:expr, $key:expr, $decision:expr) => {
        tracing::trace!(
            algorithm = $algorithm,
            key = $key,
            allowed = $decision.allowed,
            remaining = $decision.remaining,
            limit = $decision.limit,
            "Rate limit check"
        )
    };
}

/// Macro for logging storage operations with timing
#[macro_export]
macro_rules! storage_op {
    ($operation:expr, $key:expr, $result:expr, $elapsed_ms:expr) => {
        tracing::debug!(
            operation = $operation,
            key = $key,
            success = $result.is_ok(),
            elapsed_ms = $elapsed_ms,
            "Storage operation"
        )
    };
}
