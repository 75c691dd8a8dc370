// src/main.rs

use dotenv::dotenv;
use failover_limiter::config::LimiterConfig;
use failover_limiter::{init_logging, RateLimiter, SystemClock};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

// Reads one key per line on stdin and writes one JSON decision per line on stdout
#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let config = match LimiterConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(2);
        }
    };

    let limiter = match RateLimiter::from_config(&config, Arc::new(SystemClock)) {
        Ok(limiter) => limiter,
        Err(e) => {
            error!(error = %e, "Failed to build rate limiter");
            std::process::exit(2);
        }
    };
    info!(
        algorithm = limiter.algorithm(),
        capacity = limiter.capacity(),
        "Rate limiter ready, reading keys from stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let key = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read stdin");
                break;
            }
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let decision = limiter.decide(key).await;
        let line = json!({
            "key": key,
            "allowed": decision.allowed,
            "remaining": decision.remaining,
            "limit": decision.limit,
            "reset": decision.reset_epoch_secs(),
        });

        if let Err(e) = stdout.write_all(format!("{}\n", line).as_bytes()).await {
            error!(error = %e, "Failed to write decision");
            break;
        }
    }

    if let Some(health) = limiter.health() {
        info!(
            state = ?health.state,
            failures = health.failure_count,
            successes = health.success_count,
            "Shutting down"
        );
    }
    if let Err(e) = stdout.flush().await {
        error!(error = %e, "Failed to flush decisions");
    }
}
