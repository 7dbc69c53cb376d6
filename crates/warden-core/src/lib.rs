//! # Warden Core
//!
//! Command admission facade for autonomous agents. Orchestrates input
//! validation, deny and allow lists, parameter checks, semantic
//! analysis, session context, and rate limiting into one fail-closed
//! pipeline, with every decision recorded by the audit logger.
//!
//! ## Layer Coverage
//!
//! | Layer | Component | Denial Reason |
//! |-------|-----------|---------------|
//! | Syntax | Input Validator | `invalid_syntax` |
//! | Blacklist | Denylist regexes | `blacklisted` |
//! | Whitelist | Role/environment allowlists | `not_whitelisted` |
//! | Parameters | Name and value rules, injection screen | `invalid_parameters` |
//! | Semantic | Threat category analyzer | `semantic_violation` |
//! | Context | Role, environment, session anomalies | `context_violation` |
//! | RateLimit | Token bucket + sliding windows | `rate_limit_exceeded` |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       ADMISSION ENGINE                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  command ──▶ Syntax ─▶ Blacklist ─▶ Whitelist ─▶ Parameters     │
//! │                                                      │          │
//! │              RateLimit ◀─ Context ◀─ Semantic ◀──────┘          │
//! │                  │                                              │
//! │                  ▼                                              │
//! │           FilterDecision ──────────▶ Audit Logger               │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! First denial terminates the pipeline; the decision names the layer
//! family that produced it and lists every layer that ran.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use warden_core::{AdmissionEngine, AgentContext, AutonomyRole, Environment, WardenConfig};
//!
//! let engine = AdmissionEngine::new(WardenConfig::new("/var/log/warden"))?;
//! let context = AgentContext::new("agent-1", "session-1", AutonomyRole::ReadOnly, Environment::Development);
//! let decision = engine.evaluate(&context, "Get-Process", &params, &cancel).await?;
//! if decision.allowed {
//!     execute(command);
//! } else {
//!     reject(decision.reason, decision.message);
//! }
//! ```
//!
//! ## Security Notes
//!
//! - The pipeline is fail-closed: a panicking layer denies with
//!   `internal_error`, a cancelled evaluation denies with `aborted`.
//! - Pattern tables compile at construction; invalid configuration is
//!   rejected before any command can be evaluated.
//! - Audit submission never blocks the decision path.

pub mod config;
pub mod decision;
pub mod engine;
mod error;

pub use config::{
    default_layer_order, EnvironmentOverride, ParameterRule, RolePolicy, WardenConfig,
};
pub use decision::{AgentContext, DecisionReason, FilterDecision, LayerKind};
pub use engine::AdmissionEngine;
pub use error::{Result, WardenError};

// Re-export component types for convenience
pub use warden_audit::{AuditConfig, AuditLogger, AuditQuery, Severity};
pub use warden_filter::InputLimits;
pub use warden_session::{AutonomyRole, Environment, RateLimitConfig};
