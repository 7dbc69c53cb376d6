//! Background maintenance loops.
//!
//! Two long-running tasks keep limiter and session state healthy:
//! refill runs every second, pruning every five minutes with a one-hour
//! idle expiry. Both loops stop promptly on cancellation and a single
//! failed iteration is logged and skipped, never fatal.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::context::ContextValidator;
use crate::rate::RateLimiter;

/// Period of the token refill loop.
pub const REFILL_PERIOD: Duration = Duration::from_secs(1);
/// Period of the idle-state pruning loop.
pub const PRUNE_PERIOD: Duration = Duration::from_secs(300);
/// Idle time after which buckets, windows, and sessions are dropped.
pub const IDLE_EXPIRY: Duration = Duration::from_secs(3600);

/// Refills token buckets once per second until cancelled.
pub async fn run_refill(limiter: Arc<RateLimiter>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(REFILL_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("refill task stopping");
                break;
            }
            _ = interval.tick() => {
                limiter.refill_once();
            }
        }
    }
}

/// Prunes idle rate-limit and session state until cancelled.
pub async fn run_prune(
    limiter: Arc<RateLimiter>,
    sessions: Arc<ContextValidator>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(PRUNE_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("prune task stopping");
                break;
            }
            _ = interval.tick() => {
                let pruned = limiter.prune_idle(IDLE_EXPIRY) + sessions.prune_idle(IDLE_EXPIRY);
                if pruned > 0 {
                    debug!(pruned, "removed idle rate and session state");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RateLimitConfig;

    #[tokio::test]
    async fn test_refill_task_stops_on_cancel() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new()));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_refill(Arc::clone(&limiter), cancel.clone()));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_prune_task_stops_on_cancel() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new()));
        let sessions = Arc::new(ContextValidator::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_prune(limiter, sessions, cancel.clone()));

        cancel.cancel();
        handle.await.unwrap();
    }
}
