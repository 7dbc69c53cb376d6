//! Decision types: who asked, what was decided, and by which layers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_session::{AutonomyRole, Environment};

/// Immutable identity of the caller for one evaluation.
///
/// # Example
///
/// ```rust
/// use warden_core::{AgentContext, AutonomyRole, Environment};
///
/// let context = AgentContext::new("agent-1", "session-1", AutonomyRole::ReadOnly, Environment::Development)
///     .with_user("operator")
///     .with_source("10.0.0.5");
/// assert_eq!(context.role, AutonomyRole::ReadOnly);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub agent_id: String,
    pub session_id: String,
    pub role: AutonomyRole,
    pub environment: Environment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
}

impl AgentContext {
    /// Creates a context with the required fields.
    #[must_use]
    pub fn new(
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
        role: AutonomyRole,
        environment: Environment,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            role,
            environment,
            user_id: None,
            tenant_id: None,
            source_address: None,
        }
    }

    /// Sets the human user on whose behalf the agent acts.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Sets the caller's network address.
    #[must_use]
    pub fn with_source(mut self, source_address: impl Into<String>) -> Self {
        self.source_address = Some(source_address.into());
        self
    }
}

/// One stage of the admission pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Syntax,
    Blacklist,
    Whitelist,
    Parameters,
    Semantic,
    Context,
    RateLimit,
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Syntax => "syntax",
            Self::Blacklist => "blacklist",
            Self::Whitelist => "whitelist",
            Self::Parameters => "parameters",
            Self::Semantic => "semantic",
            Self::Context => "context",
            Self::RateLimit => "rate_limit",
        };
        f.write_str(name)
    }
}

/// Closed set of decision outcomes. Every denial names the layer family
/// that produced it; callers map these to their own transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Allowed,
    Blacklisted,
    NotWhitelisted,
    InvalidSyntax,
    InvalidParameters,
    SemanticViolation,
    ContextViolation,
    RateLimitExceeded,
    /// Evaluation was cancelled mid-pipeline. A deny, never an allow.
    Aborted,
    /// A layer failed unexpectedly. Fail closed.
    InternalError,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Allowed => "allowed",
            Self::Blacklisted => "blacklisted",
            Self::NotWhitelisted => "not_whitelisted",
            Self::InvalidSyntax => "invalid_syntax",
            Self::InvalidParameters => "invalid_parameters",
            Self::SemanticViolation => "semantic_violation",
            Self::ContextViolation => "context_violation",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::Aborted => "aborted",
            Self::InternalError => "internal_error",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of one evaluation. Exactly one per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDecision {
    /// Unique id for correlating with audit records.
    pub decision_id: Uuid,
    pub allowed: bool,
    pub reason: DecisionReason,
    pub message: String,
    /// On allow only: the command still needs human sign-off.
    pub requires_approval: bool,
    /// Layers run before the pipeline terminated, in order.
    pub layers_evaluated: Vec<LayerKind>,
    /// Wait hint, present on rate-limit denials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
    pub timestamp: DateTime<Utc>,
}

impl FilterDecision {
    /// Builds an allow decision.
    #[must_use]
    pub fn allow(requires_approval: bool, layers_evaluated: Vec<LayerKind>) -> Self {
        Self {
            decision_id: Uuid::new_v4(),
            allowed: true,
            reason: DecisionReason::Allowed,
            message: "command admitted".to_string(),
            requires_approval,
            layers_evaluated,
            retry_after: None,
            timestamp: Utc::now(),
        }
    }

    /// Builds a deny decision.
    #[must_use]
    pub fn deny(
        reason: DecisionReason,
        message: impl Into<String>,
        layers_evaluated: Vec<LayerKind>,
    ) -> Self {
        Self {
            decision_id: Uuid::new_v4(),
            allowed: false,
            reason,
            message: message.into(),
            requires_approval: false,
            layers_evaluated,
            retry_after: None,
            timestamp: Utc::now(),
        }
    }

    /// Attaches a retry hint.
    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_serialized_names() {
        let json = serde_json::to_string(&DecisionReason::NotWhitelisted).unwrap();
        assert_eq!(json, "\"not_whitelisted\"");
        let json = serde_json::to_string(&LayerKind::RateLimit).unwrap();
        assert_eq!(json, "\"rate_limit\"");
    }

    #[test]
    fn test_allow_decision_shape() {
        let decision = FilterDecision::allow(true, vec![LayerKind::Syntax, LayerKind::Whitelist]);
        assert!(decision.allowed);
        assert_eq!(decision.reason, DecisionReason::Allowed);
        assert!(decision.requires_approval);
        assert_eq!(decision.layers_evaluated.len(), 2);
        assert!(decision.retry_after.is_none());
    }

    #[test]
    fn test_deny_decision_shape() {
        let decision = FilterDecision::deny(
            DecisionReason::RateLimitExceeded,
            "throttled",
            vec![LayerKind::RateLimit],
        )
        .with_retry_after(Duration::from_secs(60));
        assert!(!decision.allowed);
        assert!(!decision.requires_approval);
        assert_eq!(decision.retry_after, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_decisions_get_distinct_ids() {
        let a = FilterDecision::allow(false, Vec::new());
        let b = FilterDecision::allow(false, Vec::new());
        assert_ne!(a.decision_id, b.decision_id);
    }

    #[test]
    fn test_context_builder() {
        let context = AgentContext::new("a", "s", AutonomyRole::Supervised, Environment::Staging)
            .with_tenant("acme");
        assert_eq!(context.tenant_id.as_deref(), Some("acme"));
        assert!(context.user_id.is_none());
    }
}
