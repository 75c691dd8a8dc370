// src/resilience/failover_router.rs

use std::sync::Arc;
use tracing::{debug, warn};

use crate::algorithms::{Decision, RateLimitAlgorithm};
use crate::rate_limit_event;
use crate::resilience::health_tracker::HealthTracker;
use crate::storage::RemoteStore;

/// Where a decision was made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Remote,
    Local,
}

/// Routes decisions to the remote store, falling back to a local engine.
///
/// ```plaintext
/// ┌────────┐   decide(key)   ┌────────────────┐  available?  ┌───────────────┐
/// │ caller │ ──────────────► │ FailoverRouter │ ───────────► │ HealthTracker │
/// └────────┘                 └────────────────┘              └───────────────┘
///                               │           │
///                       remote  │           │ skipped / failed
///                               ▼           ▼
///                        ┌─────────────┐ ┌──────────────┐
///                        │ RemoteStore │ │ local engine │
///                        └─────────────┘ └──────────────┘
/// ```
///
/// The local engine keeps its own per-key state, independent of the remote
/// one: during an outage each process enforces the limit on its own.
#[derive(Debug)]
pub struct FailoverRouter<R, L> {
    remote: R,
    local: L,
    health: Arc<HealthTracker>,
}

impl<R, L> FailoverRouter<R, L>
where
    R: RemoteStore,
    L: RateLimitAlgorithm,
{
    pub fn new(remote: R, local: L, health: Arc<HealthTracker>) -> Self {
        Self {
            remote,
            local,
            health,
        }
    }

    /// Decides for `key`; never fails
    pub async fn decide(&self, key: &str) -> Decision {
        self.decide_with_source(key).await.0
    }

    /// Same as [`FailoverRouter::decide`], also reporting which path answered
    pub async fn decide_with_source(&self, key: &str) -> (Decision, DecisionSource) {
        if self.health.is_available() {
            match self.remote.decide(key).await {
                Ok(decision) => {
                    self.health.mark_success();
                    return (decision, DecisionSource::Remote);
                }
                Err(e) => {
                    self.health.mark_failure();
                    warn!(key = key, error = %e, "Remote decision failed, falling back to local engine");
                }
            }
        } else {
            debug!(key = key, "Remote store degraded, using local engine");
        }

        let decision = self.local.decide(key);
        rate_limit_event!("failover_local", key, decision);
        (decision, DecisionSource::Local)
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn local(&self) -> &L {
        &self.local
    }
}
