//! Core types for session policy and rate limiting.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Agent autonomy tier, ordered from least to most autonomous.
///
/// The derived ordering is load-bearing: `Manual < ReadOnly <
/// LimitedWrite < Supervised < FullAutonomy`. Allowlist inheritance is
/// expressed as explicit policy data, never by decrementing this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyRole {
    /// Every command requires human approval.
    Manual,
    /// May observe, never mutate.
    ReadOnly,
    /// May perform routine writes; destructive verbs excluded.
    LimitedWrite,
    /// May perform destructive operations with approval.
    Supervised,
    /// Unrestricted outside Production.
    FullAutonomy,
}

impl std::fmt::Display for AutonomyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Manual => "manual",
            Self::ReadOnly => "read_only",
            Self::LimitedWrite => "limited_write",
            Self::Supervised => "supervised",
            Self::FullAutonomy => "full_autonomy",
        };
        f.write_str(name)
    }
}

/// Target environment of the managed host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Staging,
    Production,
    /// Air-gapped or sandboxed host.
    Isolated,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
            Self::Isolated => "isolated",
        };
        f.write_str(name)
    }
}

/// Outcome of context validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextVerdict {
    /// Role, environment, and session history permit the command.
    Allowed,
    /// A role rule, environment rule, or session anomaly fired.
    Violation {
        /// Human-readable description of what fired.
        detail: String,
    },
}

impl ContextVerdict {
    /// Returns true when the command passed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq)]
pub enum RateVerdict {
    /// A token was consumed and the window limits held.
    Allowed,
    /// Throttled; retry after the given duration.
    Limited {
        /// How long the caller should wait before retrying.
        retry_after: Duration,
    },
}

impl RateVerdict {
    /// Returns true when the call was admitted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Returns the retry hint, if throttled.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Allowed => None,
            Self::Limited { retry_after } => Some(*retry_after),
        }
    }
}

/// Rate limiter parameters.
///
/// # Example
///
/// ```rust
/// use warden_session::RateLimitConfig;
///
/// let config = RateLimitConfig::new()
///     .with_capacity(100.0)
///     .with_refill_rate(10.0)
///     .with_burst(0.0);
/// assert_eq!(config.capacity, 100.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Token bucket capacity per agent.
    pub capacity: f64,
    /// Tokens replenished per second.
    pub refill_rate: f64,
    /// Extra headroom above capacity during refill.
    pub burst: f64,
    /// Sliding-window limit per session per minute.
    pub per_minute_limit: usize,
    /// Sliding-window limit per session per hour.
    pub per_hour_limit: usize,
}

impl RateLimitConfig {
    /// Creates a config with defaults: capacity 100, refill 10/s,
    /// burst 20, 60 calls/minute, 600 calls/hour.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            capacity: 100.0,
            refill_rate: 10.0,
            burst: 20.0,
            per_minute_limit: 60,
            per_hour_limit: 600,
        }
    }

    /// Sets the bucket capacity.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the refill rate in tokens per second.
    #[must_use]
    pub const fn with_refill_rate(mut self, rate: f64) -> Self {
        self.refill_rate = rate;
        self
    }

    /// Sets the burst allowance.
    #[must_use]
    pub const fn with_burst(mut self, burst: f64) -> Self {
        self.burst = burst;
        self
    }

    /// Sets the per-minute window limit.
    #[must_use]
    pub const fn with_per_minute_limit(mut self, limit: usize) -> Self {
        self.per_minute_limit = limit;
        self
    }

    /// Sets the per-hour window limit.
    #[must_use]
    pub const fn with_per_hour_limit(mut self, limit: usize) -> Self {
        self.per_hour_limit = limit;
        self
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-session anomaly tracking state.
///
/// Created lazily on a session's first command and swept once the
/// session has been idle for the pruning window, on the same schedule
/// as rate-limit state.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Commands observed in this session.
    pub command_count: u64,
    /// When the previous command arrived.
    pub last_command_time: Instant,
    /// First whitespace-delimited token of the previous command.
    pub last_command_pattern: String,
    /// How many times the leading token has changed.
    pub pattern_change_count: u32,
    /// Commands containing a privilege-escalation marker.
    pub privilege_escalation_attempts: u32,
    /// Last activity, for idle pruning.
    pub last_seen: Instant,
}

impl SessionState {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            command_count: 0,
            last_command_time: now,
            last_command_pattern: String::new(),
            pattern_change_count: 0,
            privilege_escalation_attempts: 0,
            last_seen: now,
        }
    }
}
