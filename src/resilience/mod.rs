// src/resilience/mod.rs
//! Failover between the shared remote store and the process-local engines.
//!
//! 1. **Health Tracking** - Remember recent remote failures and skip the remote
//!    store while it is degraded, re-probing it after a retry window
//! 2. **Fallback** - Serve decisions from a local engine whenever the remote
//!    path is skipped or fails

mod failover_router;
mod health_tracker;

#[cfg(test)]
mod tests;

// Re-export key components
pub use failover_router::{DecisionSource, FailoverRouter};
pub use health_tracker::{HealthSnapshot, HealthState, HealthTracker};
