//! Per-session context validation.
//!
//! Enforces role and environment policy, and tracks a small per-session
//! state machine used to spot anomalous command streams: machine-speed
//! bursts, rapid thrashing between command families, and repeated
//! privilege-escalation attempts.
//!
//! ## Security Notes
//!
//! - State is keyed by session id and mutated through the map's entry
//!   API, so concurrent commands in the same session never corrupt
//!   counters.
//! - A denied command does not advance session state; a sustained
//!   anomaly therefore keeps denying instead of aging itself out.
//! - Idle sessions are swept on the same schedule as rate-limit state
//!   to bound memory.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::models::{AutonomyRole, ContextVerdict, Environment, SessionState};

/// Verb prefixes a ReadOnly role may never issue.
const WRITE_VERBS: &[&str] = &[
    "set-", "new-", "add-", "update-", "write-", "out-", "export-", "remove-", "delete-",
];

/// Verb prefixes a LimitedWrite role may never issue.
const DESTRUCTIVE_VERBS: &[&str] = &[
    "remove-",
    "delete-",
    "clear-",
    "stop-",
    "disable-",
    "format-",
    "uninstall-",
];

/// Commands reserved for the FullAutonomy tier.
const FULL_AUTONOMY_ONLY: &[&str] = &[
    "restart-computer",
    "stop-computer",
    "format-volume",
    "clear-eventlog",
    "reset-computermachinepassword",
];

/// Substrings marking a privilege-escalation attempt.
const ESCALATION_MARKERS: &[&str] = &[
    "sudo",
    "runas",
    "set-executionpolicy",
    "net localgroup",
    "add-localgroupmember",
    "usermod -ag",
];

/// Patterns never allowed against a Production host.
const PRODUCTION_DANGEROUS: &[&str] = &["rm -rf", "format c:", "drop database", "mkfs", "dd if="];

/// Command prefixes that only make sense in Development.
const DEVELOPMENT_ONLY_PREFIXES: &[&str] = &["test-", "debug-", "trace-", "measure-"];

/// Burst anomaly: more than this many commands with sub-second gaps.
const BURST_COMMAND_THRESHOLD: u64 = 100;
/// Thrash anomaly: command count floor before pattern churn matters.
const THRASH_COMMAND_THRESHOLD: u64 = 10;
/// Thrash anomaly: pattern changes tolerated before denial.
const THRASH_CHANGE_THRESHOLD: u32 = 5;
/// Escalation anomaly: marker-bearing commands tolerated.
const ESCALATION_THRESHOLD: u32 = 3;

/// Role/environment policy plus session anomaly detection.
///
/// # Example
///
/// ```rust
/// use warden_session::{AutonomyRole, ContextValidator, Environment};
///
/// let validator = ContextValidator::new();
/// let verdict = validator.validate(
///     "session-1",
///     AutonomyRole::ReadOnly,
///     Environment::Development,
///     "Get-Process",
/// );
/// assert!(verdict.is_allowed());
/// ```
#[derive(Debug, Default)]
pub struct ContextValidator {
    sessions: DashMap<String, SessionState>,
}

impl ContextValidator {
    /// Creates an empty validator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Validates a command against role rules, environment rules, and
    /// session anomaly state. Session state advances only on success.
    pub fn validate(
        &self,
        session_id: &str,
        role: AutonomyRole,
        environment: Environment,
        command: &str,
    ) -> ContextVerdict {
        let lowered = command.to_lowercase();
        let command_name = lowered.split_whitespace().next().unwrap_or("");

        if let Some(detail) = role_violation(role, environment, command_name) {
            debug!(%role, %environment, command_name, "role rule denied command");
            return ContextVerdict::Violation { detail };
        }

        if let Some(detail) = environment_violation(environment, &lowered, command_name) {
            debug!(%environment, command_name, "environment rule denied command");
            return ContextVerdict::Violation { detail };
        }

        self.check_and_update(session_id, command_name, &lowered)
    }

    /// Anomaly check against current session state, then state update.
    fn check_and_update(
        &self,
        session_id: &str,
        command_name: &str,
        lowered: &str,
    ) -> ContextVerdict {
        let now = Instant::now();
        let mut state = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(now));

        let is_escalation = ESCALATION_MARKERS.iter().any(|m| lowered.contains(m));
        let prospective_attempts = state.privilege_escalation_attempts + u32::from(is_escalation);
        let pattern_changed =
            state.command_count > 0 && state.last_command_pattern != command_name;

        if state.command_count > BURST_COMMAND_THRESHOLD
            && now.duration_since(state.last_command_time) < Duration::from_secs(1)
        {
            return ContextVerdict::Violation {
                detail: format!(
                    "anomaly: {} commands at machine speed in one session",
                    state.command_count
                ),
            };
        }

        if state.command_count > THRASH_COMMAND_THRESHOLD
            && pattern_changed
            && state.pattern_change_count > THRASH_CHANGE_THRESHOLD
        {
            return ContextVerdict::Violation {
                detail: format!(
                    "anomaly: command pattern changed {} times in one session",
                    state.pattern_change_count
                ),
            };
        }

        if prospective_attempts > ESCALATION_THRESHOLD {
            return ContextVerdict::Violation {
                detail: format!(
                    "anomaly: {} privilege escalation attempts in one session",
                    prospective_attempts
                ),
            };
        }

        state.command_count += 1;
        if pattern_changed {
            state.pattern_change_count += 1;
        }
        state.last_command_pattern = command_name.to_string();
        state.last_command_time = now;
        state.privilege_escalation_attempts = prospective_attempts;
        state.last_seen = now;

        ContextVerdict::Allowed
    }

    /// Removes sessions idle for at least `max_idle`. Returns how many
    /// were removed.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, state| now.duration_since(state.last_seen) < max_idle);
        before - self.sessions.len()
    }

    /// Number of sessions currently tracked.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of one session's state, if tracked.
    #[must_use]
    pub fn session_state(&self, session_id: &str) -> Option<SessionState> {
        self.sessions.get(session_id).map(|s| s.clone())
    }
}

fn role_violation(
    role: AutonomyRole,
    environment: Environment,
    command_name: &str,
) -> Option<String> {
    match role {
        AutonomyRole::Manual => None,
        AutonomyRole::ReadOnly => WRITE_VERBS
            .iter()
            .find(|verb| command_name.starts_with(*verb))
            .map(|verb| format!("role read_only denies write verb '{}'", verb)),
        AutonomyRole::LimitedWrite => DESTRUCTIVE_VERBS
            .iter()
            .find(|verb| command_name.starts_with(*verb))
            .map(|verb| format!("role limited_write denies destructive verb '{}'", verb)),
        AutonomyRole::Supervised => FULL_AUTONOMY_ONLY
            .iter()
            .find(|name| command_name == **name)
            .map(|name| format!("command '{}' requires full autonomy", name)),
        AutonomyRole::FullAutonomy => {
            if environment == Environment::Production {
                Some("full autonomy is suspended in production".to_string())
            } else {
                None
            }
        }
    }
}

fn environment_violation(
    environment: Environment,
    lowered: &str,
    command_name: &str,
) -> Option<String> {
    if environment != Environment::Production {
        return None;
    }
    if let Some(pattern) = PRODUCTION_DANGEROUS.iter().find(|p| lowered.contains(**p)) {
        return Some(format!("pattern '{}' is not allowed in production", pattern));
    }
    DEVELOPMENT_ONLY_PREFIXES
        .iter()
        .find(|prefix| command_name.starts_with(**prefix))
        .map(|prefix| format!("'{}' commands are development-only", prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(role: AutonomyRole, env: Environment, command: &str) -> ContextVerdict {
        ContextValidator::new().validate("s1", role, env, command)
    }

    #[test]
    fn test_readonly_allows_get() {
        let v = validate(
            AutonomyRole::ReadOnly,
            Environment::Development,
            "Get-Process",
        );
        assert!(v.is_allowed());
    }

    #[test]
    fn test_readonly_denies_write_verb() {
        let v = validate(
            AutonomyRole::ReadOnly,
            Environment::Development,
            "Set-Service -Name W32Time -Status Running",
        );
        assert!(!v.is_allowed());
    }

    #[test]
    fn test_limited_write_allows_set() {
        let v = validate(
            AutonomyRole::LimitedWrite,
            Environment::Development,
            "Set-Content -Path log.txt -Value done",
        );
        assert!(v.is_allowed());
    }

    #[test]
    fn test_limited_write_denies_destructive() {
        let v = validate(
            AutonomyRole::LimitedWrite,
            Environment::Development,
            "Remove-Item -Path C:/temp -Recurse",
        );
        assert!(!v.is_allowed());
    }

    #[test]
    fn test_supervised_denies_full_autonomy_command() {
        let v = validate(
            AutonomyRole::Supervised,
            Environment::Development,
            "Restart-Computer -Force",
        );
        assert!(!v.is_allowed());
    }

    #[test]
    fn test_supervised_allows_destructive_verb() {
        let v = validate(
            AutonomyRole::Supervised,
            Environment::Development,
            "Remove-Item -Path C:/temp/file.txt",
        );
        assert!(v.is_allowed());
    }

    #[test]
    fn test_full_autonomy_denied_in_production() {
        let v = validate(
            AutonomyRole::FullAutonomy,
            Environment::Production,
            "Get-Process",
        );
        assert!(!v.is_allowed());
    }

    #[test]
    fn test_full_autonomy_allowed_in_development() {
        let v = validate(
            AutonomyRole::FullAutonomy,
            Environment::Development,
            "Remove-Item -Path C:/temp -Recurse",
        );
        assert!(v.is_allowed());
    }

    #[test]
    fn test_manual_role_unconstrained() {
        let v = validate(
            AutonomyRole::Manual,
            Environment::Development,
            "Remove-Item -Path C:/everything -Recurse",
        );
        assert!(v.is_allowed());
    }

    #[test]
    fn test_production_dangerous_pattern() {
        let v = validate(
            AutonomyRole::Supervised,
            Environment::Production,
            "Invoke-Script 'rm -rf /var/www'",
        );
        assert!(!v.is_allowed());
    }

    #[test]
    fn test_production_denies_dev_only_prefix() {
        let v = validate(
            AutonomyRole::Supervised,
            Environment::Production,
            "Debug-Process -Id 1234",
        );
        assert!(!v.is_allowed());
    }

    #[test]
    fn test_dev_only_prefix_fine_in_development() {
        let v = validate(
            AutonomyRole::Supervised,
            Environment::Development,
            "Debug-Process -Id 1234",
        );
        assert!(v.is_allowed());
    }

    #[test]
    fn test_escalation_attempts_denied_past_threshold() {
        let validator = ContextValidator::new();
        for _ in 0..3 {
            let v = validator.validate(
                "s1",
                AutonomyRole::FullAutonomy,
                Environment::Development,
                "sudo systemctl status nginx",
            );
            assert!(v.is_allowed());
        }
        let v = validator.validate(
            "s1",
            AutonomyRole::FullAutonomy,
            Environment::Development,
            "sudo cat /var/log/auth.log",
        );
        assert!(!v.is_allowed());
    }

    #[test]
    fn test_burst_anomaly() {
        let validator = ContextValidator::new();
        for _ in 0..101 {
            let v = validator.validate(
                "s1",
                AutonomyRole::ReadOnly,
                Environment::Development,
                "Get-Process",
            );
            assert!(v.is_allowed());
        }
        // 102nd machine-speed command crosses the burst threshold.
        let v = validator.validate(
            "s1",
            AutonomyRole::ReadOnly,
            Environment::Development,
            "Get-Process",
        );
        assert!(!v.is_allowed());
    }

    #[test]
    fn test_pattern_thrash_anomaly() {
        let validator = ContextValidator::new();
        for i in 0..11 {
            let command = if i % 2 == 0 { "Get-Process" } else { "Get-Service" };
            let v = validator.validate(
                "s1",
                AutonomyRole::ReadOnly,
                Environment::Development,
                command,
            );
            assert!(v.is_allowed(), "command {} should pass", i);
        }
        let v = validator.validate(
            "s1",
            AutonomyRole::ReadOnly,
            Environment::Development,
            "Get-Date",
        );
        assert!(!v.is_allowed());
    }

    #[test]
    fn test_sessions_are_independent() {
        let validator = ContextValidator::new();
        for _ in 0..3 {
            validator.validate(
                "s1",
                AutonomyRole::FullAutonomy,
                Environment::Development,
                "sudo ls",
            );
        }
        // A different session starts with a clean escalation count.
        let v = validator.validate(
            "s2",
            AutonomyRole::FullAutonomy,
            Environment::Development,
            "sudo ls",
        );
        assert!(v.is_allowed());
    }

    #[test]
    fn test_denied_command_does_not_advance_state() {
        let validator = ContextValidator::new();
        let v = validator.validate(
            "s1",
            AutonomyRole::ReadOnly,
            Environment::Development,
            "Set-Service -Name x",
        );
        assert!(!v.is_allowed());
        assert!(validator.session_state("s1").is_none());
    }

    #[test]
    fn test_prune_idle() {
        let validator = ContextValidator::new();
        validator.validate(
            "s1",
            AutonomyRole::ReadOnly,
            Environment::Development,
            "Get-Process",
        );
        assert_eq!(validator.session_count(), 1);
        let pruned = validator.prune_idle(Duration::ZERO);
        assert_eq!(pruned, 1);
        assert_eq!(validator.session_count(), 0);
    }
}
