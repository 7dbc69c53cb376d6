//! Warden CLI - evaluate commands, query the audit log, verify integrity

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use warden_audit::{AuditLogger, AuditQuery, Severity};
use warden_core::{AdmissionEngine, AgentContext, AutonomyRole, Environment, WardenConfig};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden - command admission and audit for autonomous agents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Evaluate a command through the admission pipeline
    Evaluate {
        /// The command text to evaluate
        command: String,
        /// Parameters as name=value, repeatable
        #[arg(short, long = "param")]
        params: Vec<String>,
        /// Agent identifier
        #[arg(long, default_value = "cli-agent")]
        agent: String,
        /// Session identifier
        #[arg(long, default_value = "cli-session")]
        session: String,
        /// Autonomy role: manual, read_only, limited_write, supervised, full_autonomy
        #[arg(short, long, default_value = "read_only")]
        role: String,
        /// Target environment: development, staging, production, isolated
        #[arg(short, long, default_value = "development")]
        environment: String,
        /// Audit log directory; decisions are recorded when set
        #[arg(long)]
        audit_dir: Option<PathBuf>,
    },
    /// Query audit entries in a time range
    Query {
        /// Audit log directory
        #[arg(long, default_value = "audit-logs")]
        audit_dir: PathBuf,
        /// Range start, RFC 3339; defaults to 24 hours ago
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Range end, RFC 3339; defaults to now
        #[arg(long)]
        until: Option<DateTime<Utc>>,
        /// Filter by agent identifier
        #[arg(long)]
        agent: Option<String>,
        /// Filter by session identifier
        #[arg(long)]
        session: Option<String>,
        /// Minimum severity: info, warning, critical
        #[arg(long)]
        min_severity: Option<String>,
    },
    /// Recompute integrity hashes over stored audit entries
    Verify {
        /// Audit log directory
        #[arg(long, default_value = "audit-logs")]
        audit_dir: PathBuf,
        /// Range start, RFC 3339; defaults to 30 days ago
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Range end, RFC 3339; defaults to now
        #[arg(long)]
        until: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Evaluate {
            command,
            params,
            agent,
            session,
            role,
            environment,
            audit_dir,
        }) => {
            evaluate(
                &command,
                &params,
                &agent,
                &session,
                &role,
                &environment,
                audit_dir,
            )
            .await
        }
        Some(Commands::Query {
            audit_dir,
            since,
            until,
            agent,
            session,
            min_severity,
        }) => query(&audit_dir, since, until, agent, session, min_severity),
        Some(Commands::Verify {
            audit_dir,
            since,
            until,
        }) => verify(&audit_dir, since, until),
        None => {
            println!("warden - use --help for commands");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn evaluate(
    command: &str,
    params: &[String],
    agent: &str,
    session: &str,
    role: &str,
    environment: &str,
    audit_dir: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let role = parse_role(role)?;
    let environment = parse_environment(environment)?;
    let parameters = parse_params(params)?;

    let config_dir = audit_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("audit-logs"));
    let engine_config = WardenConfig::new(config_dir);

    let audit = match audit_dir {
        Some(_) => Some(Arc::new(
            AuditLogger::start(engine_config.audit.clone())
                .context("failed to start audit logger")?,
        )),
        None => None,
    };

    let mut engine = AdmissionEngine::new(engine_config)?;
    if let Some(audit) = &audit {
        engine = engine.with_audit(Arc::clone(audit));
    }

    let context = AgentContext::new(agent, session, role, environment);
    let decision = engine
        .evaluate(&context, command, &parameters, &CancellationToken::new())
        .await?;

    println!("{}", serde_json::to_string_pretty(&decision)?);

    drop(engine);
    if let Some(audit) = audit {
        if let Ok(logger) = Arc::try_unwrap(audit) {
            logger.shutdown().await;
        }
    }

    Ok(if decision.allowed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn query(
    audit_dir: &std::path::Path,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    agent: Option<String>,
    session: Option<String>,
    min_severity: Option<String>,
) -> anyhow::Result<ExitCode> {
    let until = until.unwrap_or_else(Utc::now);
    let since = since.unwrap_or(until - Duration::hours(24));

    let mut q = AuditQuery::between(since, until);
    if let Some(agent) = agent {
        q = q.with_agent(agent);
    }
    if let Some(session) = session {
        q = q.with_session(session);
    }
    if let Some(severity) = min_severity {
        q = q.with_min_severity(parse_severity(&severity)?);
    }

    let entries = warden_audit::query::query_dir(audit_dir, &q)?;
    for entry in &entries {
        println!("{}", serde_json::to_string(entry)?);
    }
    eprintln!("{} entries", entries.len());
    Ok(ExitCode::SUCCESS)
}

fn verify(
    audit_dir: &std::path::Path,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> anyhow::Result<ExitCode> {
    let until = until.unwrap_or_else(Utc::now);
    let since = since.unwrap_or(until - Duration::days(30));

    let entries = warden_audit::query::query_dir(audit_dir, &AuditQuery::between(since, until))?;
    let mut invalid = 0usize;
    for entry in &entries {
        if !entry.verify()? {
            invalid += 1;
            eprintln!(
                "integrity failure: event {} at {}",
                entry.event_id, entry.timestamp
            );
        }
    }

    println!("{} entries checked, {} invalid", entries.len(), invalid);
    Ok(if invalid == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn parse_role(value: &str) -> anyhow::Result<AutonomyRole> {
    Ok(match value.to_lowercase().as_str() {
        "manual" => AutonomyRole::Manual,
        "read_only" | "readonly" => AutonomyRole::ReadOnly,
        "limited_write" | "limitedwrite" => AutonomyRole::LimitedWrite,
        "supervised" => AutonomyRole::Supervised,
        "full_autonomy" | "fullautonomy" => AutonomyRole::FullAutonomy,
        other => bail!("unknown role '{other}'"),
    })
}

fn parse_environment(value: &str) -> anyhow::Result<Environment> {
    Ok(match value.to_lowercase().as_str() {
        "development" | "dev" => Environment::Development,
        "staging" => Environment::Staging,
        "production" | "prod" => Environment::Production,
        "isolated" => Environment::Isolated,
        other => bail!("unknown environment '{other}'"),
    })
}

fn parse_severity(value: &str) -> anyhow::Result<Severity> {
    Ok(match value.to_lowercase().as_str() {
        "info" => Severity::Info,
        "warning" => Severity::Warning,
        "critical" => Severity::Critical,
        other => bail!("unknown severity '{other}'"),
    })
}

fn parse_params(params: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for raw in params {
        let Some((name, value)) = raw.split_once('=') else {
            bail!("parameter '{raw}' is not in name=value form");
        };
        map.insert(name.to_string(), value.to_string());
    }
    Ok(map)
}
