//! Audit record types.
//!
//! An [`AuditEvent`] is what callers describe: who did what, with which
//! outcome. An [`AuditLogEntry`] is what gets persisted: the event plus
//! the fields only the logger may assign, a unique id, a UTC timestamp,
//! and an integrity hash over the canonical form of everything else.
//!
//! The hash is computed after redaction, so verification works on the
//! stored entry without ever needing the original secrets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::canonical;

/// Errors from audit persistence and verification.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Filesystem operation failed.
    #[error("audit io error: {0}")]
    Io(#[from] std::io::Error),

    /// An entry could not be serialized or deserialized.
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The logger has shut down and accepts no further events.
    #[error("audit logger is closed")]
    Closed,

    /// A query's start bound was after its end bound.
    #[error("query start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Convenience alias for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;

/// What kind of thing happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A command passed through the admission pipeline.
    CommandEvaluated,
    /// An admitted command ran to completion.
    CommandExecuted,
    /// An admitted command ran and failed.
    CommandFailed,
    /// A policy layer denied a command.
    SecurityViolation,
    /// The rate limiter throttled a caller.
    RateLimited,
    /// Lifecycle and operational events.
    SystemEvent,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CommandEvaluated => "command_evaluated",
            Self::CommandExecuted => "command_executed",
            Self::CommandFailed => "command_failed",
            Self::SecurityViolation => "security_violation",
            Self::RateLimited => "rate_limited",
            Self::SystemEvent => "system_event",
        };
        f.write_str(name)
    }
}

/// How urgently an operator should care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Command-centric payload of an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    /// The command text, post-sanitization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Parameters after sanitization and redaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitized_parameters: Option<Value>,
    /// Outcome summary, for executed commands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Wall-clock runtime, for executed commands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    /// Error detail, for failures and denials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Where the request came from and how it was decided.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authz_decision: Option<String>,
}

/// The managed resource a command targeted, when one is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceContext {
    pub resource_type: String,
    pub resource_id: String,
}

/// A caller-described audit event, before the logger assigns identity
/// and integrity fields.
///
/// # Example
///
/// ```rust
/// use warden_audit::{AuditEvent, EventType, Severity};
///
/// let event = AuditEvent::new("agent-1", "session-1", EventType::CommandEvaluated, Severity::Info)
///     .with_command("Get-Process")
///     .with_result("allowed");
/// assert_eq!(event.agent_id, "agent-1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub agent_id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub event_type: EventType,
    pub severity: Severity,
    pub event_data: EventData,
    pub security_context: SecurityContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_context: Option<ResourceContext>,
    /// Free-form deployment metadata, redacted like everything else.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl AuditEvent {
    /// Creates an event with empty payload sections.
    #[must_use]
    pub fn new(
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
        event_type: EventType,
        severity: Severity,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            user_id: None,
            event_type,
            severity,
            event_data: EventData::default(),
            security_context: SecurityContext::default(),
            resource_context: None,
            metadata: Value::Null,
        }
    }

    /// Sets the acting user.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the command text.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.event_data.command = Some(command.into());
        self
    }

    /// Sets the sanitized parameter payload.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.event_data.sanitized_parameters = Some(parameters);
        self
    }

    /// Sets the outcome summary.
    #[must_use]
    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.event_data.result = Some(result.into());
        self
    }

    /// Sets the error detail.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.event_data.error = Some(error.into());
        self
    }

    /// Sets the measured runtime.
    #[must_use]
    pub fn with_execution_time_ms(mut self, millis: u64) -> Self {
        self.event_data.execution_time_ms = Some(millis);
        self
    }

    /// Sets the security context.
    #[must_use]
    pub fn with_security_context(mut self, context: SecurityContext) -> Self {
        self.security_context = context;
        self
    }

    /// Sets the targeted resource.
    #[must_use]
    pub fn with_resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.resource_context = Some(ResourceContext {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        });
        self
    }

    /// Sets free-form metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A persisted audit entry: an event plus logger-assigned identity and
/// a hash over the canonical form of every other field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Assignment time, UTC.
    pub timestamp: DateTime<Utc>,
    /// Unique id, assigned at ingestion.
    pub event_id: Uuid,
    #[serde(flatten)]
    pub event: AuditEvent,
    /// Lowercase hex SHA-256 of the entry's canonical form with this
    /// field absent.
    pub integrity_hash: String,
}

impl AuditLogEntry {
    /// Wraps an event with a fresh id and the current time. The hash is
    /// left empty until [`seal`](Self::seal) runs.
    #[must_use]
    pub fn from_event(event: AuditEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event_id: Uuid::new_v4(),
            event,
            integrity_hash: String::new(),
        }
    }

    /// Computes the integrity hash over everything except the hash
    /// field itself.
    pub fn compute_hash(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("integrity_hash");
        }
        Ok(canonical::hash_hex(&value))
    }

    /// Computes and stores the integrity hash.
    pub fn seal(&mut self) -> Result<()> {
        self.integrity_hash = self.compute_hash()?;
        Ok(())
    }

    /// Recomputes the hash and compares it with the stored one.
    ///
    /// Returns `false` for entries whose content was altered after
    /// sealing, and for entries never sealed at all.
    pub fn verify(&self) -> Result<bool> {
        Ok(!self.integrity_hash.is_empty() && self.compute_hash()? == self.integrity_hash)
    }
}
