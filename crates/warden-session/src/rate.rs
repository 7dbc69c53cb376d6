//! Token-bucket and sliding-window rate limiting.
//!
//! Two independent mechanisms, both of which must pass:
//!
//! - A **token bucket** per agent id. A background task refills every
//!   bucket once a second at the configured rate, capped at capacity
//!   plus burst. Each admitted call consumes one token.
//! - **Sliding windows** per session id, counting timestamps over the
//!   trailing minute and hour. Windows are pruned before counting, so
//!   old activity never inflates the totals.
//!
//! State lives in per-key map entries; unrelated agents never serialize
//! behind each other's checks.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::models::{RateLimitConfig, RateVerdict};

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

#[derive(Debug)]
struct SlidingWindow {
    minute: Vec<Instant>,
    hour: Vec<Instant>,
    last_seen: Instant,
}

/// Per-agent and per-session throttling.
///
/// # Example
///
/// ```rust
/// use warden_session::{RateLimitConfig, RateLimiter};
///
/// let limiter = RateLimiter::new(RateLimitConfig::new());
/// assert!(limiter.check("agent-1", "session-1").is_allowed());
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, TokenBucket>,
    windows: DashMap<String, SlidingWindow>,
}

impl RateLimiter {
    /// Creates a limiter with the given parameters.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
            windows: DashMap::new(),
        }
    }

    /// Returns the configured parameters.
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Checks both mechanisms and consumes a token on admission.
    ///
    /// The bucket is checked first; a bucket denial reports the time
    /// until one token is available. Window denials report the window
    /// length.
    pub fn check(&self, agent_id: &str, session_id: &str) -> RateVerdict {
        let now = Instant::now();

        {
            let mut bucket = self
                .buckets
                .entry(agent_id.to_string())
                .or_insert_with(|| TokenBucket {
                    tokens: self.config.capacity,
                    last_refill: now,
                    last_seen: now,
                });
            bucket.last_seen = now;

            if bucket.tokens < 1.0 {
                let deficit = 1.0 - bucket.tokens;
                let wait = (deficit / self.config.refill_rate).ceil().max(1.0);
                debug!(agent_id, tokens = bucket.tokens, "token bucket exhausted");
                return RateVerdict::Limited {
                    retry_after: Duration::from_secs(wait as u64),
                };
            }
            bucket.tokens -= 1.0;
        }

        let mut window = self
            .windows
            .entry(session_id.to_string())
            .or_insert_with(|| SlidingWindow {
                minute: Vec::new(),
                hour: Vec::new(),
                last_seen: now,
            });
        window.last_seen = now;

        window
            .minute
            .retain(|t| now.duration_since(*t) < Duration::from_secs(60));
        window
            .hour
            .retain(|t| now.duration_since(*t) < Duration::from_secs(3600));

        if window.minute.len() >= self.config.per_minute_limit {
            debug!(session_id, count = window.minute.len(), "per-minute limit hit");
            return RateVerdict::Limited {
                retry_after: Duration::from_secs(60),
            };
        }
        if window.hour.len() >= self.config.per_hour_limit {
            debug!(session_id, count = window.hour.len(), "per-hour limit hit");
            return RateVerdict::Limited {
                retry_after: Duration::from_secs(3600),
            };
        }

        window.minute.push(now);
        window.hour.push(now);
        RateVerdict::Allowed
    }

    /// Refills every bucket for the time elapsed since its last refill,
    /// capped at capacity plus burst. Called by the background task.
    pub fn refill_once(&self) {
        let now = Instant::now();
        let cap = self.config.capacity + self.config.burst;
        for mut entry in self.buckets.iter_mut() {
            let elapsed = now.duration_since(entry.last_refill).as_secs_f64();
            entry.tokens = (entry.tokens + elapsed * self.config.refill_rate).min(cap);
            entry.last_refill = now;
        }
    }

    /// Removes buckets and windows idle for at least `max_idle`.
    /// Returns how many entries were removed.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len() + self.windows.len();
        self.buckets
            .retain(|_, b| now.duration_since(b.last_seen) < max_idle);
        self.windows
            .retain(|_, w| now.duration_since(w.last_seen) < max_idle);
        before - (self.buckets.len() + self.windows.len())
    }

    /// Tokens remaining for an agent, if a bucket exists.
    #[must_use]
    pub fn tokens_remaining(&self, agent_id: &str) -> Option<f64> {
        self.buckets.get(agent_id).map(|b| b.tokens)
    }

    /// Number of tracked buckets and windows.
    #[must_use]
    pub fn tracked_entries(&self) -> usize {
        self.buckets.len() + self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_agent_allowed() {
        let limiter = RateLimiter::new(RateLimitConfig::new());
        assert!(limiter.check("a1", "s1").is_allowed());
    }

    #[test]
    fn test_bucket_exhaustion_and_retry_after() {
        let config = RateLimitConfig::new()
            .with_capacity(100.0)
            .with_refill_rate(10.0)
            .with_burst(0.0)
            .with_per_minute_limit(1000)
            .with_per_hour_limit(10_000);
        let limiter = RateLimiter::new(config);

        for i in 0..100 {
            assert!(limiter.check("a1", "s1").is_allowed(), "call {} should pass", i);
        }
        let verdict = limiter.check("a1", "s1");
        assert!(!verdict.is_allowed());
        assert!(verdict.retry_after().unwrap() >= Duration::from_secs(1));
    }

    #[test]
    fn test_refill_restores_tokens() {
        let config = RateLimitConfig::new()
            .with_capacity(1.0)
            .with_refill_rate(1000.0)
            .with_burst(0.0)
            .with_per_minute_limit(1000)
            .with_per_hour_limit(10_000);
        let limiter = RateLimiter::new(config);

        assert!(limiter.check("a1", "s1").is_allowed());
        assert!(!limiter.check("a1", "s1").is_allowed());

        std::thread::sleep(Duration::from_millis(10));
        limiter.refill_once();
        assert!(limiter.check("a1", "s1").is_allowed());
    }

    #[test]
    fn test_refill_capped_at_capacity_plus_burst() {
        let config = RateLimitConfig::new()
            .with_capacity(10.0)
            .with_refill_rate(1000.0)
            .with_burst(5.0);
        let limiter = RateLimiter::new(config);

        limiter.check("a1", "s1");
        std::thread::sleep(Duration::from_millis(50));
        limiter.refill_once();
        let tokens = limiter.tokens_remaining("a1").unwrap();
        assert!(tokens <= 15.0);
    }

    #[test]
    fn test_per_minute_window() {
        let config = RateLimitConfig::new()
            .with_capacity(1000.0)
            .with_per_minute_limit(3)
            .with_per_hour_limit(10_000);
        let limiter = RateLimiter::new(config);

        for _ in 0..3 {
            assert!(limiter.check("a1", "s1").is_allowed());
        }
        let verdict = limiter.check("a1", "s1");
        assert_eq!(verdict.retry_after(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_per_hour_window() {
        let config = RateLimitConfig::new()
            .with_capacity(1000.0)
            .with_per_minute_limit(1000)
            .with_per_hour_limit(3);
        let limiter = RateLimiter::new(config);

        for _ in 0..3 {
            assert!(limiter.check("a1", "s1").is_allowed());
        }
        let verdict = limiter.check("a1", "s1");
        assert_eq!(verdict.retry_after(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_agents_have_independent_buckets() {
        let config = RateLimitConfig::new()
            .with_capacity(1.0)
            .with_burst(0.0)
            .with_per_minute_limit(1000)
            .with_per_hour_limit(10_000);
        let limiter = RateLimiter::new(config);

        assert!(limiter.check("a1", "s1").is_allowed());
        assert!(!limiter.check("a1", "s1").is_allowed());
        assert!(limiter.check("a2", "s2").is_allowed());
    }

    #[test]
    fn test_sessions_have_independent_windows() {
        let config = RateLimitConfig::new()
            .with_capacity(1000.0)
            .with_per_minute_limit(1)
            .with_per_hour_limit(10_000);
        let limiter = RateLimiter::new(config);

        assert!(limiter.check("a1", "s1").is_allowed());
        assert!(!limiter.check("a1", "s1").is_allowed());
        assert!(limiter.check("a1", "s2").is_allowed());
    }

    #[test]
    fn test_prune_idle() {
        let limiter = RateLimiter::new(RateLimitConfig::new());
        limiter.check("a1", "s1");
        assert_eq!(limiter.tracked_entries(), 2);
        let pruned = limiter.prune_idle(Duration::ZERO);
        assert_eq!(pruned, 2);
        assert_eq!(limiter.tracked_entries(), 0);
    }

    #[test]
    fn test_denied_window_call_not_recorded() {
        let config = RateLimitConfig::new()
            .with_capacity(1000.0)
            .with_per_minute_limit(2)
            .with_per_hour_limit(10_000);
        let limiter = RateLimiter::new(config);

        assert!(limiter.check("a1", "s1").is_allowed());
        assert!(limiter.check("a1", "s1").is_allowed());
        assert!(!limiter.check("a1", "s1").is_allowed());
        // The denial itself did not occupy a window slot; pruning after
        // 60 seconds would admit again, and repeated denials never
        // extend the window.
        assert!(!limiter.check("a1", "s1").is_allowed());
    }

    #[test]
    fn test_concurrent_checks_consume_exactly_available_tokens() {
        use std::sync::Arc;

        let config = RateLimitConfig::new()
            .with_capacity(50.0)
            .with_burst(0.0)
            .with_per_minute_limit(10_000)
            .with_per_hour_limit(100_000);
        let limiter = Arc::new(RateLimiter::new(config));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    let mut allowed = 0u32;
                    for j in 0..10 {
                        if limiter.check("a1", &format!("s{}-{}", i, j)).is_allowed() {
                            allowed += 1;
                        }
                    }
                    allowed
                })
            })
            .collect();

        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 50);
    }
}
