//! Time-range queries over persisted audit entries.
//!
//! Queries scan only the partitions whose date falls inside the
//! requested range, decompressing rotated `.gz` files on the fly.
//! Malformed lines are logged and skipped rather than failing the
//! whole query, so one corrupt record cannot hide the rest of a day.
//! Results are returned in a stable order, by timestamp and then by
//! event id, regardless of which files the entries came from.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::record::{AuditError, AuditLogEntry, EventType, Result, Severity};
use crate::sink;

/// Filter for audit queries. Time bounds are required and inclusive;
/// all other criteria are optional and conjunctive.
///
/// # Example
///
/// ```rust
/// use chrono::{Duration, Utc};
/// use warden_audit::{AuditQuery, EventType};
///
/// let end = Utc::now();
/// let query = AuditQuery::between(end - Duration::hours(1), end)
///     .with_event_type(EventType::SecurityViolation)
///     .with_agent("agent-1");
/// assert_eq!(query.agent_id.as_deref(), Some("agent-1"));
/// ```
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub event_type: Option<EventType>,
    pub min_severity: Option<Severity>,
}

impl AuditQuery {
    /// Creates a query over an inclusive time range.
    #[must_use]
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            agent_id: None,
            session_id: None,
            event_type: None,
            min_severity: None,
        }
    }

    /// Restricts results to one agent.
    #[must_use]
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Restricts results to one session.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Restricts results to one event type.
    #[must_use]
    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Drops results below the given severity.
    #[must_use]
    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    fn matches(&self, entry: &AuditLogEntry) -> bool {
        if entry.timestamp < self.start || entry.timestamp > self.end {
            return false;
        }
        if let Some(agent_id) = &self.agent_id {
            if entry.event.agent_id != *agent_id {
                return false;
            }
        }
        if let Some(session_id) = &self.session_id {
            if entry.event.session_id != *session_id {
                return false;
            }
        }
        if let Some(event_type) = self.event_type {
            if entry.event.event_type != event_type {
                return false;
            }
        }
        if let Some(min) = self.min_severity {
            if entry.event.severity < min {
                return false;
            }
        }
        true
    }
}

/// Scans the log directory for entries matching `query`.
///
/// # Errors
///
/// Returns [`AuditError::InvalidRange`] when the start bound is after
/// the end bound, and io errors when the directory cannot be read.
pub fn query_dir(log_dir: &Path, query: &AuditQuery) -> Result<Vec<AuditLogEntry>> {
    if query.start > query.end {
        return Err(AuditError::InvalidRange {
            start: query.start,
            end: query.end,
        });
    }

    let first_date = query.start.date_naive();
    let last_date = query.end.date_naive();
    let mut entries = Vec::new();

    for dir_entry in std::fs::read_dir(log_dir)? {
        let path = dir_entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(date) = sink::parse_partition_date(name) else {
            continue;
        };
        if date < first_date || date > last_date {
            continue;
        }

        let text = sink::read_log_file(&path)?;
        for (line_no, line) in text.lines().enumerate() {
            match serde_json::from_str::<AuditLogEntry>(line) {
                Ok(entry) if query.matches(&entry) => entries.push(entry),
                Ok(_) => {}
                Err(error) => {
                    warn!(file = name, line = line_no + 1, %error, "skipping malformed audit line");
                }
            }
        }
    }

    entries.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });
    Ok(entries)
}
