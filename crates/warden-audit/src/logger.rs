//! The audit logger front end and its writer task.
//!
//! [`AuditLogger::record`] is the only call sites ever make on the hot
//! path, and it never blocks and never returns an error: the event goes
//! into a bounded channel and a single writer task does the rest. The
//! writer redacts, assigns identity, seals the integrity hash, and fans
//! the entry out to every sink.
//!
//! Backpressure policy: when the channel is full the event is dropped
//! and counted, never queued unboundedly. A security decision must not
//! stall because the disk is slow; the drop counter makes the loss
//! visible instead.
//!
//! Shutdown drains what is already queued, which the channel bounds to
//! its capacity, and gives up after a grace period so a wedged sink
//! cannot hang process exit.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::query::{self, AuditQuery};
use crate::record::{AuditEvent, AuditLogEntry, Result};
use crate::redact::Redactor;
use crate::sink::{AuditSink, FileSink};

/// Audit logger parameters.
///
/// # Example
///
/// ```rust
/// use warden_audit::AuditConfig;
///
/// let config = AuditConfig::new("/var/log/warden")
///     .with_max_file_bytes(50 * 1024 * 1024)
///     .with_retain_days(30);
/// assert_eq!(config.retain_days, 30);
/// ```
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Directory holding the date-partitioned log files.
    pub log_dir: PathBuf,
    /// Size at which the active partition rotates.
    pub max_file_bytes: u64,
    /// Bound of the ingestion channel; also the shutdown drain bound.
    pub channel_capacity: usize,
    /// How long shutdown waits for the writer to drain.
    pub shutdown_grace: Duration,
    /// Age in days at which uncompressed partitions are gzipped.
    pub compress_after_days: u32,
    /// Age in days at which partitions are deleted.
    pub retain_days: u32,
    /// Deployment-specific sensitive key fragments, added to the
    /// built-in redaction set.
    pub redact_keys: Vec<String>,
}

impl AuditConfig {
    /// Creates a config with defaults: 10 MiB partitions, a 1024-entry
    /// channel, 5 second shutdown grace, compression after 1 day, and
    /// 90 day retention.
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            max_file_bytes: 10 * 1024 * 1024,
            channel_capacity: 1024,
            shutdown_grace: Duration::from_secs(5),
            compress_after_days: 1,
            retain_days: 90,
            redact_keys: Vec::new(),
        }
    }

    /// Sets the rotation threshold.
    #[must_use]
    pub fn with_max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes;
        self
    }

    /// Sets the ingestion channel capacity.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Sets the shutdown drain grace period.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Sets the compression age in days.
    #[must_use]
    pub fn with_compress_after_days(mut self, days: u32) -> Self {
        self.compress_after_days = days;
        self
    }

    /// Sets the retention age in days.
    #[must_use]
    pub fn with_retain_days(mut self, days: u32) -> Self {
        self.retain_days = days;
        self
    }

    /// Adds deployment-specific redaction key fragments.
    #[must_use]
    pub fn with_redact_keys(mut self, keys: Vec<String>) -> Self {
        self.redact_keys = keys;
        self
    }
}

/// Non-blocking, hash-sealing audit logger.
///
/// # Example
///
/// ```rust,no_run
/// use warden_audit::{AuditConfig, AuditEvent, AuditLogger, EventType, Severity};
///
/// # #[tokio::main] async fn main() {
/// let logger = AuditLogger::start(AuditConfig::new("./audit")).unwrap();
/// logger.record(
///     AuditEvent::new("agent-1", "session-1", EventType::CommandEvaluated, Severity::Info)
///         .with_command("Get-Process"),
/// );
/// logger.shutdown().await;
/// # }
/// ```
pub struct AuditLogger {
    tx: mpsc::Sender<AuditEvent>,
    writer: JoinHandle<()>,
    config: AuditConfig,
    dropped: AtomicU64,
}

impl AuditLogger {
    /// Starts the logger with the built-in file sink.
    ///
    /// # Errors
    ///
    /// Fails when the log directory cannot be created. Must be called
    /// from within a Tokio runtime.
    pub fn start(config: AuditConfig) -> Result<Self> {
        Self::start_with_sinks(config, Vec::new())
    }

    /// Starts the logger with the file sink plus additional sinks.
    /// Every sealed entry goes to every sink; a failing sink is logged
    /// and skipped without affecting the others.
    pub fn start_with_sinks(
        config: AuditConfig,
        extra_sinks: Vec<Box<dyn AuditSink>>,
    ) -> Result<Self> {
        let file_sink = FileSink::new(&config.log_dir, config.max_file_bytes)?;
        let mut sinks: Vec<Box<dyn AuditSink>> = vec![Box::new(file_sink)];
        sinks.extend(extra_sinks);

        let redactor = Redactor::new().with_extra_keys(&config.redact_keys);
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let writer = tokio::spawn(run_writer(rx, sinks, redactor));

        Ok(Self {
            tx,
            writer,
            config,
            dropped: AtomicU64::new(0),
        })
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Submits an event for persistence.
    ///
    /// Never blocks and never fails: if the channel is full or the
    /// writer has stopped, the event is dropped and counted.
    pub fn record(&self, event: AuditEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(event_type = %event.event_type, "audit channel full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(event_type = %event.event_type, "audit writer stopped, dropping event");
            }
        }
    }

    /// How many events have been dropped since start.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Reads persisted entries matching `query` from this logger's
    /// directory. Entries still queued in the channel are not visible.
    pub fn query(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>> {
        query::query_dir(&self.config.log_dir, query)
    }

    /// Closes the channel and waits for the writer to drain what is
    /// already queued, up to the configured grace period.
    pub async fn shutdown(self) {
        drop(self.tx);
        if tokio::time::timeout(self.config.shutdown_grace, self.writer)
            .await
            .is_err()
        {
            warn!("audit writer did not drain within the shutdown grace period");
        }
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("log_dir", &self.config.log_dir)
            .field("dropped", &self.dropped())
            .finish()
    }
}

async fn run_writer(
    mut rx: mpsc::Receiver<AuditEvent>,
    sinks: Vec<Box<dyn AuditSink>>,
    redactor: Redactor,
) {
    while let Some(event) = rx.recv().await {
        let entry = match seal_event(&redactor, event) {
            Ok(entry) => entry,
            Err(error) => {
                error!(%error, "failed to seal audit entry");
                continue;
            }
        };
        for sink in &sinks {
            if let Err(error) = sink.write(&entry) {
                error!(sink = sink.name(), %error, "audit sink write failed");
            }
        }
    }
    debug!("audit writer drained and stopped");
}

/// Redacts, wraps, and seals an event. Redaction runs first so the
/// integrity hash covers the redacted form.
fn seal_event(redactor: &Redactor, event: AuditEvent) -> Result<AuditLogEntry> {
    let mut value = serde_json::to_value(&event)?;
    redactor.redact(&mut value);
    let event: AuditEvent = serde_json::from_value(value)?;

    let mut entry = AuditLogEntry::from_event(event);
    entry.seal()?;
    Ok(entry)
}
