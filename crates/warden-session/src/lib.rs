//! # Warden Session - Context Validation and Rate Limiting
//!
//! Per-session and per-agent stateful policy: who may do what, and how
//! fast. This crate owns the only mutable state on the decision path,
//! so its structure is dictated by concurrency: every counter lives in
//! a per-key map entry, mutated atomically, and swept by background
//! tasks so idle agents never cost memory.
//!
//! ## Capabilities
//!
//! 1. **Role Rules** - Verb-prefix policy per autonomy tier: ReadOnly
//!    never writes, LimitedWrite never destroys, Supervised never runs
//!    full-autonomy commands, FullAutonomy is suspended in Production.
//!
//! 2. **Environment Rules** - Production refuses known-dangerous
//!    patterns and development-only command prefixes outright.
//!
//! 3. **Session Anomaly Detection** - A small state machine per session
//!    flags machine-speed bursts, command-family thrashing, and
//!    repeated privilege-escalation attempts.
//!
//! 4. **Rate Limiting** - Token bucket per agent plus sliding minute and
//!    hour windows per session; denials carry a retry hint.
//!
//! ## Security Notes
//!
//! - A denied command never advances session state, so anomalies do not
//!   age themselves out under sustained attack.
//! - All state is bounded: a pruning task removes anything idle for an
//!   hour, sessions and buckets alike.
//!
//! ## Usage
//!
//! ```rust
//! use warden_session::{
//!     AutonomyRole, ContextValidator, Environment, RateLimitConfig, RateLimiter,
//! };
//!
//! let sessions = ContextValidator::new();
//! let limiter = RateLimiter::new(RateLimitConfig::new());
//!
//! let verdict = sessions.validate(
//!     "session-1",
//!     AutonomyRole::ReadOnly,
//!     Environment::Development,
//!     "Get-Process",
//! );
//! assert!(verdict.is_allowed());
//! assert!(limiter.check("agent-1", "session-1").is_allowed());
//! ```

pub mod context;
pub mod models;
pub mod rate;
pub mod tasks;

pub use context::ContextValidator;
pub use models::{
    AutonomyRole, ContextVerdict, Environment, RateLimitConfig, RateVerdict, SessionState,
};
pub use rate::RateLimiter;
