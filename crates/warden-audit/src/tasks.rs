//! Background retention maintenance.
//!
//! One long-running task walks the log directory once a day: partitions
//! older than the compression age are gzipped, partitions older than
//! the retention age are deleted. The active partition for the current
//! day is never touched. The loop stops promptly on cancellation and a
//! failed sweep is logged and retried next period, never fatal.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::record::Result;
use crate::sink;

/// Period of the retention sweep.
pub const RETENTION_PERIOD: Duration = Duration::from_secs(24 * 3600);

/// Sweeps the log directory until cancelled.
pub async fn run_retention(
    log_dir: impl AsRef<Path>,
    compress_after_days: u32,
    retain_days: u32,
    cancel: CancellationToken,
) {
    let log_dir = log_dir.as_ref();
    let mut interval = tokio::time::interval(RETENTION_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("retention task stopping");
                break;
            }
            _ = interval.tick() => {
                match enforce_retention(log_dir, compress_after_days, retain_days) {
                    Ok((compressed, deleted)) if compressed + deleted > 0 => {
                        debug!(compressed, deleted, "retention sweep finished");
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!(%error, "retention sweep failed");
                    }
                }
            }
        }
    }
}

/// Runs one retention sweep. Returns how many partitions were
/// compressed and how many were deleted.
///
/// Deletion wins over compression: a partition past the retention age
/// is removed even if it was never compressed.
pub fn enforce_retention(
    log_dir: &Path,
    compress_after_days: u32,
    retain_days: u32,
) -> Result<(usize, usize)> {
    let today = Utc::now().date_naive();
    let mut compressed = 0;
    let mut deleted = 0;

    for dir_entry in std::fs::read_dir(log_dir)? {
        let path = dir_entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(date) = sink::parse_partition_date(name) else {
            continue;
        };
        let age_days = (today - date).num_days();

        if age_days > i64::from(retain_days) {
            std::fs::remove_file(&path)?;
            deleted += 1;
        } else if age_days >= i64::from(compress_after_days.max(1))
            && !name.ends_with(sink::COMPRESSED_SUFFIX)
        {
            sink::compress_file(&path)?;
            compressed += 1;
        }
    }

    Ok((compressed, deleted))
}
