//! # Audit Logger Integration Tests
//!
//! End-to-end lifecycle tests: record through a running logger, shut it
//! down, then read what actually landed on disk.
//!
//! ## Coverage
//!
//! | Behavior | Test |
//! |----------|------|
//! | Full lifecycle with filtered queries | `test_lifecycle_and_filters` |
//! | Rotation produces compressed partitions | `test_rotation_compresses_rotated_files` |
//! | Queries span compressed and plain files | `test_query_spans_compressed_partitions` |
//! | Post-write tampering is detectable | `test_tampering_is_detected` |
//! | Retention compresses and deletes by age | `test_retention_by_age` |

use std::fs;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use warden_audit::tasks::enforce_retention;
use warden_audit::{
    AuditConfig, AuditEvent, AuditLogger, AuditQuery, EventType, Severity,
};

fn event(agent: &str, severity: Severity) -> AuditEvent {
    AuditEvent::new(agent, "session-1", EventType::CommandEvaluated, severity)
        .with_command("Get-Process")
        .with_result("allowed")
}

fn everything() -> AuditQuery {
    let now = Utc::now();
    AuditQuery::between(now - Duration::hours(1), now + Duration::hours(1))
}

#[tokio::test]
async fn test_lifecycle_and_filters() {
    let temp_dir = TempDir::new().unwrap();
    let logger = AuditLogger::start(AuditConfig::new(temp_dir.path())).unwrap();

    for n in 0..10 {
        let severity = if n % 5 == 0 {
            Severity::Critical
        } else {
            Severity::Info
        };
        let agent = if n % 2 == 0 { "agent-a" } else { "agent-b" };
        logger.record(event(agent, severity));
    }
    assert_eq!(logger.dropped(), 0);
    logger.shutdown().await;

    let all = warden_audit::query::query_dir(temp_dir.path(), &everything()).unwrap();
    assert_eq!(all.len(), 10);
    assert!(all.iter().all(|e| e.verify().unwrap()));

    let agent_a = warden_audit::query::query_dir(
        temp_dir.path(),
        &everything().with_agent("agent-a"),
    )
    .unwrap();
    assert_eq!(agent_a.len(), 5);

    let critical = warden_audit::query::query_dir(
        temp_dir.path(),
        &everything().with_min_severity(Severity::Critical),
    )
    .unwrap();
    assert_eq!(critical.len(), 2);
}

#[tokio::test]
async fn test_rotation_compresses_rotated_files() {
    let temp_dir = TempDir::new().unwrap();
    let config = AuditConfig::new(temp_dir.path()).with_max_file_bytes(512);
    let logger = AuditLogger::start(config).unwrap();

    for _ in 0..30 {
        logger.record(event("agent-a", Severity::Info));
    }
    logger.shutdown().await;

    let mut plain = 0usize;
    let mut compressed = 0usize;
    for dir_entry in fs::read_dir(temp_dir.path()).unwrap() {
        let name = dir_entry.unwrap().file_name().to_string_lossy().to_string();
        if name.ends_with(".log.json.gz") {
            compressed += 1;
        } else if name.ends_with(".log.json") {
            plain += 1;
        }
    }
    assert!(compressed >= 1, "rotation should have compressed a partition");
    assert_eq!(plain, 1, "exactly one active partition remains");
}

#[tokio::test]
async fn test_query_spans_compressed_partitions() {
    let temp_dir = TempDir::new().unwrap();
    let config = AuditConfig::new(temp_dir.path()).with_max_file_bytes(512);
    let logger = AuditLogger::start(config).unwrap();

    for _ in 0..30 {
        logger.record(event("agent-a", Severity::Info));
    }
    logger.shutdown().await;

    let entries = warden_audit::query::query_dir(temp_dir.path(), &everything()).unwrap();
    assert_eq!(entries.len(), 30, "no entry lost across rotations");
    assert!(entries.iter().all(|e| e.verify().unwrap()));
    assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn test_tampering_is_detected() {
    let temp_dir = TempDir::new().unwrap();
    let logger = AuditLogger::start(AuditConfig::new(temp_dir.path())).unwrap();
    logger.record(event("agent-a", Severity::Info));
    logger.shutdown().await;

    for dir_entry in fs::read_dir(temp_dir.path()).unwrap() {
        let path = dir_entry.unwrap().path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            let doctored = fs::read_to_string(&path)
                .unwrap()
                .replace("Get-Process", "Remove-Item");
            fs::write(&path, doctored).unwrap();
        }
    }

    let entries = warden_audit::query::query_dir(temp_dir.path(), &everything()).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(
        !entries[0].verify().unwrap(),
        "modified entry must fail verification"
    );
}

#[test]
fn test_retention_by_age() {
    let temp_dir = TempDir::new().unwrap();

    let ancient = temp_dir.path().join("2020-01-01.log.json");
    let recent = temp_dir
        .path()
        .join(format!("{}.log.json", (Utc::now() - Duration::days(3)).format("%Y-%m-%d")));
    let today = temp_dir
        .path()
        .join(format!("{}.log.json", Utc::now().format("%Y-%m-%d")));
    for path in [&ancient, &recent, &today] {
        fs::write(path, "{}\n").unwrap();
    }

    let (compressed, deleted) = enforce_retention(temp_dir.path(), 1, 90).unwrap();
    assert_eq!(deleted, 1, "the ancient partition ages out");
    assert_eq!(compressed, 1, "the recent partition compresses");

    assert!(!ancient.exists());
    assert!(!recent.exists());
    let recent_gz = format!("{}.gz", recent.display());
    assert!(std::path::Path::new(&recent_gz).exists());
    assert!(today.exists(), "the active partition is never touched");
}
