//! Audit output sinks.
//!
//! The writer task fans every sealed entry out to a set of sinks. Each
//! sink fails independently: one sink's error is logged and skipped,
//! and the remaining sinks still receive the entry.
//!
//! The built-in [`FileSink`] appends NDJSON to date-partitioned files,
//! `{yyyy-MM-dd}.log.json`, one entry per line. When the active file
//! for a day crosses the size threshold it is renamed to
//! `{yyyy-MM-dd}.{HHmmss}.log.json` and gzip-compressed, and a fresh
//! active file starts.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::record::{AuditLogEntry, Result};

/// Suffix shared by all audit log files.
pub(crate) const LOG_SUFFIX: &str = ".log.json";

/// Suffix of compressed, rotated files.
pub(crate) const COMPRESSED_SUFFIX: &str = ".log.json.gz";

/// Destination for sealed audit entries.
///
/// Implementations must be safe to call from the single writer task
/// and should return quickly; slow sinks delay every sink behind them.
pub trait AuditSink: Send + Sync {
    /// Short identifier used in failure logs.
    fn name(&self) -> &str;

    /// Persists one sealed entry.
    fn write(&self, entry: &AuditLogEntry) -> Result<()>;
}

/// NDJSON file sink with date partitioning and size-based rotation.
#[derive(Debug)]
pub struct FileSink {
    log_dir: PathBuf,
    max_file_bytes: u64,
}

impl FileSink {
    /// Creates the sink, creating the log directory if needed.
    pub fn new(log_dir: impl Into<PathBuf>, max_file_bytes: u64) -> Result<Self> {
        let log_dir = log_dir.into();
        std::fs::create_dir_all(&log_dir)?;
        Ok(Self {
            log_dir,
            max_file_bytes,
        })
    }

    /// Directory this sink writes into.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    fn rotate(&self, active: &Path, now: DateTime<Utc>) -> Result<()> {
        // Several rotations can land in the same second; bump a suffix
        // until the name is free so no rotated partition is overwritten.
        let mut rotated = self.log_dir.join(rotated_file_name(now, 0));
        let mut sequence = 0u32;
        while rotated.exists() || PathBuf::from(format!("{}.gz", rotated.display())).exists() {
            sequence += 1;
            rotated = self.log_dir.join(rotated_file_name(now, sequence));
        }
        std::fs::rename(active, &rotated)?;
        compress_file(&rotated)?;
        debug!(path = %rotated.display(), "rotated audit partition");
        Ok(())
    }
}

impl AuditSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn write(&self, entry: &AuditLogEntry) -> Result<()> {
        let path = self
            .log_dir
            .join(partition_file_name(entry.timestamp.date_naive()));

        if let Ok(meta) = std::fs::metadata(&path) {
            if meta.len() >= self.max_file_bytes {
                self.rotate(&path, entry.timestamp)?;
            }
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Sink that mirrors every sealed entry onto the `tracing` pipeline.
///
/// Useful when audit entries should also reach whatever subscriber the
/// host process has installed, for live tailing or shipping. The file
/// sink remains the durable record; this one is best-effort by nature.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Creates the sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    fn write(&self, entry: &AuditLogEntry) -> Result<()> {
        use crate::record::Severity;
        match entry.event.severity {
            Severity::Critical => tracing::error!(
                event_id = %entry.event_id,
                event_type = %entry.event.event_type,
                agent_id = %entry.event.agent_id,
                result = entry.event.event_data.result.as_deref().unwrap_or(""),
                "audit"
            ),
            Severity::Warning => tracing::warn!(
                event_id = %entry.event_id,
                event_type = %entry.event.event_type,
                agent_id = %entry.event.agent_id,
                result = entry.event.event_data.result.as_deref().unwrap_or(""),
                "audit"
            ),
            Severity::Info => tracing::info!(
                event_id = %entry.event_id,
                event_type = %entry.event.event_type,
                agent_id = %entry.event.agent_id,
                result = entry.event.event_data.result.as_deref().unwrap_or(""),
                "audit"
            ),
        }
        Ok(())
    }
}

/// Active partition name for a date: `2026-08-06.log.json`.
pub(crate) fn partition_file_name(date: NaiveDate) -> String {
    format!("{}{}", date.format("%Y-%m-%d"), LOG_SUFFIX)
}

/// Rotated partition name: `2026-08-06.143007.log.json`, with a
/// sequence suffix (`2026-08-06.143007-1.log.json`) past the first
/// rotation in a given second.
pub(crate) fn rotated_file_name(now: DateTime<Utc>, sequence: u32) -> String {
    if sequence == 0 {
        format!("{}{}", now.format("%Y-%m-%d.%H%M%S"), LOG_SUFFIX)
    } else {
        format!("{}-{sequence}{}", now.format("%Y-%m-%d.%H%M%S"), LOG_SUFFIX)
    }
}

/// Extracts the partition date from a log file name, compressed or not.
pub(crate) fn parse_partition_date(file_name: &str) -> Option<NaiveDate> {
    if !file_name.ends_with(LOG_SUFFIX) && !file_name.ends_with(COMPRESSED_SUFFIX) {
        return None;
    }
    let prefix = file_name.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Replaces `path` with a gzip-compressed `path.gz`.
pub(crate) fn compress_file(path: &Path) -> Result<()> {
    let compressed_path = PathBuf::from(format!("{}.gz", path.display()));

    let mut input = File::open(path)?;
    let output = File::create(&compressed_path)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    std::io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;

    std::fs::remove_file(path)?;
    Ok(())
}

/// Reads a log file's full text, decompressing when the name ends in
/// `.gz`.
pub(crate) fn read_log_file(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut text = String::new();
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        GzDecoder::new(BufReader::new(file)).read_to_string(&mut text)?;
    } else {
        BufReader::new(file).read_to_string(&mut text)?;
    }
    Ok(text)
}
