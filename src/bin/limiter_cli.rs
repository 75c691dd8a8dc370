// src/bin/limiter_cli.rs

use chrono::{DateTime, Utc};
use dotenv::dotenv;
use prettytable::{row, Table};
use std::sync::Arc;
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tokio::time;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use failover_limiter::config::{AlgorithmConfig, LimiterConfig, RedisConfig};
use failover_limiter::{Decision, RateLimiter, SystemClock};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "limiter_cli",
    about = "A CLI for exercising the rate limiting algorithms and Redis failover"
)]
struct Opt {
    /// Rate limiting algorithm to use
    #[structopt(short, long, possible_values = &["fixed_window", "sliding_window", "leaky_bucket", "token_bucket"], default_value = "token_bucket")]
    algorithm: String,

    /// Key to use for rate limiting
    #[structopt(short, long, default_value = "default_user")]
    key: String,

    /// Maximum budget per key
    #[structopt(short, long, default_value = "10")]
    capacity: u64,

    /// Window duration in seconds (window algorithms)
    #[structopt(short, long, default_value = "60")]
    window_seconds: u64,

    /// Refill or drain rate per second (bucket algorithms)
    #[structopt(short, long, default_value = "1.0")]
    rate: f64,

    /// Simulation mode
    #[structopt(long, possible_values = &["burst", "concurrent", "steady"], default_value = "burst")]
    simulation: String,

    /// Number of requests to simulate
    #[structopt(short = "n", long, default_value = "20")]
    num_requests: usize,

    /// Time between requests in milliseconds (steady mode)
    #[structopt(short = "t", long, default_value = "100")]
    interval_ms: u64,

    /// Use a Redis token bucket with local failover
    #[structopt(long)]
    redis_url: Option<String>,

    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    /// Disable logs
    #[structopt(long)]
    disable_logs: bool,
}

#[derive(Debug, Default)]
struct Summary {
    allowed: usize,
    denied: usize,
    last: Option<Decision>,
}

impl Summary {
    fn record(&mut self, decision: Decision) {
        if decision.allowed {
            self.allowed += 1;
        } else {
            self.denied += 1;
        }
        self.last = Some(decision);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let opt = Opt::from_args();

    let log_level = match (opt.disable_logs, opt.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "limiter_cli={},failover_limiter={}",
                log_level, log_level
            ))
        }))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let algorithm = AlgorithmConfig::from_parts(
        &opt.algorithm,
        opt.capacity,
        opt.rate,
        Duration::from_secs(opt.window_seconds),
    )?;
    let config = LimiterConfig {
        algorithm,
        redis: opt.redis_url.as_deref().map(RedisConfig::new),
        ..LimiterConfig::default()
    };
    let limiter = Arc::new(RateLimiter::from_config(&config, Arc::new(SystemClock))?);

    info!(
        algorithm = %opt.algorithm,
        capacity = opt.capacity,
        simulation = %opt.simulation,
        "Starting simulation"
    );

    let started = Instant::now();
    let summary = match opt.simulation.as_str() {
        "concurrent" => simulate_concurrent(&opt, &limiter).await?,
        "steady" => simulate_steady(&opt, &limiter).await,
        _ => simulate_burst(&opt, &limiter).await,
    };

    print_summary(&opt, &limiter, &summary, started.elapsed());
    Ok(())
}

// Fire every request back to back
async fn simulate_burst(opt: &Opt, limiter: &RateLimiter) -> Summary {
    let mut summary = Summary::default();
    for i in 0..opt.num_requests {
        let decision = limiter.decide(&opt.key).await;
        log_decision(i, &decision);
        summary.record(decision);
    }
    summary
}

// Fire every request at once from separate tasks
async fn simulate_concurrent(
    opt: &Opt,
    limiter: &Arc<RateLimiter>,
) -> Result<Summary, Box<dyn std::error::Error>> {
    let handles: Vec<_> = (0..opt.num_requests)
        .map(|_| {
            let limiter = Arc::clone(limiter);
            let key = opt.key.clone();
            tokio::spawn(async move { limiter.decide(&key).await })
        })
        .collect();

    let mut summary = Summary::default();
    for (i, result) in futures::future::join_all(handles).await.into_iter().enumerate() {
        let decision = result?;
        log_decision(i, &decision);
        summary.record(decision);
    }
    Ok(summary)
}

// One request every interval_ms
async fn simulate_steady(opt: &Opt, limiter: &RateLimiter) -> Summary {
    let mut summary = Summary::default();
    let mut ticker = time::interval(Duration::from_millis(opt.interval_ms.max(1)));
    for i in 0..opt.num_requests {
        ticker.tick().await;
        let decision = limiter.decide(&opt.key).await;
        log_decision(i, &decision);
        summary.record(decision);
    }
    summary
}

fn log_decision(i: usize, decision: &Decision) {
    if decision.allowed {
        info!("Request {}: ALLOWED (remaining: {})", i + 1, decision.remaining);
    } else {
        warn!("Request {}: DENIED (limit: {})", i + 1, decision.limit);
    }
}

fn print_summary(opt: &Opt, limiter: &RateLimiter, summary: &Summary, elapsed: Duration) {
    let mut table = Table::new();
    table.add_row(row!["Algorithm", limiter.algorithm()]);
    table.add_row(row!["Simulation", opt.simulation]);
    table.add_row(row!["Total requests", opt.num_requests]);
    table.add_row(row!["Allowed", summary.allowed]);
    table.add_row(row!["Denied", summary.denied]);
    table.add_row(row!["Time elapsed", format!("{:?}", elapsed)]);

    if let Some(last) = &summary.last {
        let reset: DateTime<Utc> = last.reset_at.into();
        table.add_row(row!["Last remaining", last.remaining]);
        table.add_row(row!["Last reset", reset.to_rfc3339()]);
    }

    if let Some(health) = limiter.health() {
        table.add_row(row!["Remote state", format!("{:?}", health.state)]);
        table.add_row(row!["Remote failures", health.failure_count]);
        table.add_row(row!["Remote successes", health.success_count]);
    }

    println!();
    table.printstd();
}
