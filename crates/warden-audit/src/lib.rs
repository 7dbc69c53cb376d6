//! # Warden Audit - Hash-Verified Audit Logging
//!
//! Append-only, tamper-evident logging for every admission decision.
//! Recording is non-blocking by construction: callers hand an event to
//! a bounded channel and a single writer task redacts it, seals it with
//! an integrity hash, and fans it out to every configured sink.
//!
//! ## Capabilities
//!
//! 1. **Tamper Evidence** - Each entry carries a SHA-256 hash of its
//!    RFC 8785 canonical form; any post-write modification is
//!    detectable by recomputation.
//!
//! 2. **Secret Redaction** - Credentials, tokens, and key material are
//!    replaced before hashing, so logs can be shipped and verified
//!    without ever containing a secret.
//!
//! 3. **Bounded Footprint** - Date-partitioned NDJSON files rotate at a
//!    size threshold, compress after a day, and age out after the
//!    retention window.
//!
//! 4. **Queryability** - Time-range queries with agent, session, type,
//!    and severity filters, in a stable order, across compressed and
//!    uncompressed partitions alike.
//!
//! ## Threat Model
//!
//! | Threat | Defense |
//! |--------|---------|
//! | Log tampering after the fact | Canonical-form SHA-256 per entry |
//! | Credential leakage via logs | Key and value redaction pre-hash |
//! | Disk exhaustion | Rotation, compression, retention sweeps |
//! | Slow disk stalling admissions | Bounded channel, drop-and-count |
//!
//! ## Security Notes
//!
//! - Redaction runs before hashing, so verification never needs the
//!   original secret and redacted entries still verify.
//! - A full channel drops events rather than blocking the decision
//!   path; the drop counter makes the loss observable.
//!
//! ## Usage
//!
//! ```rust
//! use warden_audit::{AuditEvent, AuditLogEntry, EventType, Severity};
//!
//! let event = AuditEvent::new("agent-1", "session-1", EventType::CommandEvaluated, Severity::Info)
//!     .with_command("Get-Process")
//!     .with_result("allowed");
//!
//! let mut entry = AuditLogEntry::from_event(event);
//! entry.seal().unwrap();
//! assert!(entry.verify().unwrap());
//! ```

pub mod canonical;
pub mod logger;
pub mod query;
pub mod record;
pub mod redact;
pub mod sink;
pub mod tasks;

pub use logger::{AuditConfig, AuditLogger};
pub use query::AuditQuery;
pub use record::{
    AuditError, AuditEvent, AuditLogEntry, EventData, EventType, ResourceContext, Result,
    SecurityContext, Severity,
};
pub use redact::{Redactor, REDACTION_MARKER};
pub use sink::{AuditSink, FileSink, TracingSink};
