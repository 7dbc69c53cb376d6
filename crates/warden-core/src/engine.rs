//! The admission engine: an ordered pipeline of filter layers with
//! fail-closed semantics.
//!
//! Layers run in the configured order and the first denial terminates
//! evaluation. A panicking layer is treated as a denial, never as a
//! pass, and a cancelled evaluation denies with its own reason so the
//! caller can tell the difference from policy.
//!
//! ## Security Notes
//!
//! - All pattern tables are compiled at construction; a config that
//!   does not compile is rejected before the engine can serve traffic.
//! - The audit submission path never blocks evaluation; a full queue
//!   drops the event and the logger counts the loss.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use regex::{Regex, RegexBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use warden_audit::{AuditEvent, AuditLogger, EventType, SecurityContext, Severity};
use warden_filter::{InjectionDetector, InputValidator, ValidationFailure};
use warden_semantic::{SemanticAnalyzer, SemanticVerdict};
use warden_session::{
    tasks as session_tasks, AutonomyRole, ContextValidator, ContextVerdict, Environment,
    RateLimiter, RateVerdict,
};

use crate::config::{RolePolicy, WardenConfig};
use crate::decision::{AgentContext, DecisionReason, FilterDecision, LayerKind};
use crate::error::{Result, WardenError};

/// Verb prefixes that mark a state-changing command. A LimitedWrite
/// agent may run these only with human approval.
const WRITE_VERBS: &[&str] = &[
    "set-", "new-", "add-", "update-", "write-", "out-", "export-", "remove-", "delete-",
];

/// Verb prefixes that mark a destructive command. A Supervised agent
/// may run these only with human approval.
const DESTRUCTIVE_VERBS: &[&str] = &[
    "remove-",
    "delete-",
    "clear-",
    "stop-",
    "disable-",
    "format-",
    "uninstall-",
];

/// Commands that always need approval in Production, whatever the role.
const PRODUCTION_HIGH_RISK: &[&str] = &[
    "restart-computer",
    "stop-computer",
    "restart-service",
    "stop-service",
    "remove-item",
    "format-volume",
    "clear-eventlog",
];

/// One allowlist entry, pre-lowered at compile time.
#[derive(Debug, Clone)]
enum CommandPattern {
    /// Matches every command.
    Any,
    /// Matches commands starting with the prefix (from a trailing `*`).
    Prefix(String),
    /// Matches the command name exactly.
    Exact(String),
}

impl CommandPattern {
    fn compile(pattern: &str) -> Self {
        let lowered = pattern.to_lowercase();
        if lowered == "*" {
            Self::Any
        } else if let Some(prefix) = lowered.strip_suffix('*') {
            Self::Prefix(prefix.to_string())
        } else {
            Self::Exact(lowered)
        }
    }

    fn matches(&self, command_name: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Prefix(prefix) => command_name.starts_with(prefix.as_str()),
            Self::Exact(name) => command_name == name,
        }
    }
}

/// A parameter rule with its value regex compiled.
#[derive(Debug)]
struct CompiledParameterRule {
    value_pattern: Option<Regex>,
    allowed_values: Vec<String>,
}

/// What one layer concluded.
enum LayerOutcome {
    Pass,
    Deny {
        reason: DecisionReason,
        message: String,
        retry_after: Option<Duration>,
    },
}

/// The admission pipeline. Construction compiles every pattern table;
/// evaluation is lock-free reads plus the shared session and rate maps.
///
/// # Example
///
/// ```rust
/// use std::collections::BTreeMap;
///
/// use tokio_util::sync::CancellationToken;
/// use warden_core::{AdmissionEngine, AgentContext, AutonomyRole, Environment, WardenConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> warden_core::Result<()> {
/// let engine = AdmissionEngine::new(WardenConfig::new("/tmp/warden-audit"))?;
/// let context = AgentContext::new(
///     "agent-1",
///     "session-1",
///     AutonomyRole::ReadOnly,
///     Environment::Development,
/// );
/// let decision = engine
///     .evaluate(&context, "Get-Process", &BTreeMap::new(), &CancellationToken::new())
///     .await?;
/// assert!(decision.allowed);
/// # Ok(())
/// # }
/// ```
pub struct AdmissionEngine {
    config: Arc<WardenConfig>,
    denylist: Vec<(String, Regex)>,
    whitelists: HashMap<(AutonomyRole, Environment), Vec<CommandPattern>>,
    parameter_rules: HashMap<String, CompiledParameterRule>,
    allowed_parameter_names: Option<HashSet<String>>,
    validator: InputValidator,
    injection: InjectionDetector,
    semantic: SemanticAnalyzer,
    sessions: Arc<ContextValidator>,
    limiter: Arc<RateLimiter>,
    audit: Option<Arc<AuditLogger>>,
}

impl std::fmt::Debug for AdmissionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionEngine")
            .field("layer_order", &self.config.layer_order)
            .field("denylist_len", &self.denylist.len())
            .field("whitelists", &self.whitelists.len())
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

impl AdmissionEngine {
    /// Compiles a configuration into an engine.
    ///
    /// Fails on a denylist pattern that does not compile, a parameter
    /// rule with an invalid regex, a role referencing an unknown
    /// category, or an inheritance edge naming an undeclared role.
    pub fn new(config: WardenConfig) -> Result<Self> {
        let denylist = compile_denylist(&config.denylist)?;
        let whitelists = compile_whitelists(&config)?;
        let parameter_rules = compile_parameter_rules(&config)?;
        let allowed_parameter_names = config
            .allowed_parameter_names
            .as_ref()
            .map(|names| names.iter().map(|n| n.to_lowercase()).collect());

        let validator = InputValidator::new(config.input_limits.clone());
        let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));

        info!(
            layers = config.layer_order.len(),
            denylist = denylist.len(),
            roles = config.roles.len(),
            "admission engine compiled"
        );

        Ok(Self {
            config: Arc::new(config),
            denylist,
            whitelists,
            parameter_rules,
            allowed_parameter_names,
            validator,
            injection: InjectionDetector::new(),
            semantic: SemanticAnalyzer::new(),
            sessions: Arc::new(ContextValidator::new()),
            limiter,
            audit: None,
        })
    }

    /// Attaches an audit logger. Every decision is then recorded.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Returns the compiled configuration.
    #[must_use]
    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Returns the shared session validator.
    #[must_use]
    pub fn sessions(&self) -> &Arc<ContextValidator> {
        &self.sessions
    }

    /// Returns the shared rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Spawns the background maintenance loops: token refill, idle
    /// state pruning, and (when audit is attached) retention sweeps.
    /// All loops stop when `cancel` fires.
    pub fn spawn_maintenance(&self, cancel: &CancellationToken) {
        tokio::spawn(session_tasks::run_refill(
            Arc::clone(&self.limiter),
            cancel.clone(),
        ));
        tokio::spawn(session_tasks::run_prune(
            Arc::clone(&self.limiter),
            Arc::clone(&self.sessions),
            cancel.clone(),
        ));
        if let Some(audit) = &self.audit {
            let audit_config = audit.config();
            tokio::spawn(warden_audit::tasks::run_retention(
                audit_config.log_dir.clone(),
                audit_config.compress_after_days,
                audit_config.retain_days,
                cancel.clone(),
            ));
        }
    }

    /// Runs the full pipeline for one command and returns exactly one
    /// decision.
    ///
    /// Errors are reserved for contract violations: an empty command
    /// or a blank required context field. Every policy outcome,
    /// including denials, is a normal [`FilterDecision`].
    pub async fn evaluate(
        &self,
        context: &AgentContext,
        command: &str,
        parameters: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<FilterDecision> {
        if command.trim().is_empty() {
            return Err(WardenError::EmptyCommand);
        }
        if context.agent_id.trim().is_empty() {
            return Err(WardenError::IncompleteContext { field: "agent_id" });
        }
        if context.session_id.trim().is_empty() {
            return Err(WardenError::IncompleteContext {
                field: "session_id",
            });
        }

        let lowered = command.to_lowercase();
        let command_name = lowered.split_whitespace().next().unwrap_or("");

        let mut layers_evaluated = Vec::with_capacity(self.config.layer_order.len());
        let mut decision = None;

        for layer in &self.config.layer_order {
            if cancel.is_cancelled() {
                warn!(agent_id = %context.agent_id, "evaluation cancelled mid-pipeline");
                decision = Some(FilterDecision::deny(
                    DecisionReason::Aborted,
                    "evaluation cancelled",
                    layers_evaluated.clone(),
                ));
                break;
            }

            layers_evaluated.push(*layer);
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                self.run_layer(*layer, context, command, command_name, parameters)
            }));

            match outcome {
                Ok(LayerOutcome::Pass) => {}
                Ok(LayerOutcome::Deny {
                    reason,
                    message,
                    retry_after,
                }) => {
                    debug!(layer = %layer, %reason, "layer denied command");
                    let mut deny =
                        FilterDecision::deny(reason, message, layers_evaluated.clone());
                    if let Some(retry_after) = retry_after {
                        deny = deny.with_retry_after(retry_after);
                    }
                    decision = Some(deny);
                    break;
                }
                Err(_) => {
                    error!(layer = %layer, agent_id = %context.agent_id, "layer panicked");
                    decision = Some(FilterDecision::deny(
                        DecisionReason::InternalError,
                        format!("{layer} layer failed"),
                        layers_evaluated.clone(),
                    ));
                    break;
                }
            }
        }

        let decision = decision.unwrap_or_else(|| {
            let requires_approval =
                self.requires_approval(context.role, context.environment, command_name);
            FilterDecision::allow(requires_approval, layers_evaluated)
        });

        self.submit_audit(context, command, parameters, &decision);
        Ok(decision)
    }

    fn run_layer(
        &self,
        layer: LayerKind,
        context: &AgentContext,
        command: &str,
        command_name: &str,
        parameters: &BTreeMap<String, String>,
    ) -> LayerOutcome {
        match layer {
            LayerKind::Syntax => self.check_syntax(command),
            LayerKind::Blacklist => self.check_blacklist(command),
            LayerKind::Whitelist => self.check_whitelist(context, command_name),
            LayerKind::Parameters => self.check_parameters(command, parameters),
            LayerKind::Semantic => self.check_semantic(command, parameters),
            LayerKind::Context => self.check_context(context, command),
            LayerKind::RateLimit => self.check_rate_limit(context),
        }
    }

    fn check_syntax(&self, command: &str) -> LayerOutcome {
        let report = self.validator.validate(command, &BTreeMap::new());
        if report.ok {
            LayerOutcome::Pass
        } else {
            LayerOutcome::Deny {
                reason: DecisionReason::InvalidSyntax,
                message: report.summary(),
                retry_after: None,
            }
        }
    }

    fn check_blacklist(&self, command: &str) -> LayerOutcome {
        for (pattern, regex) in &self.denylist {
            if regex.is_match(command) {
                return LayerOutcome::Deny {
                    reason: DecisionReason::Blacklisted,
                    message: format!("command matches denied pattern '{pattern}'"),
                    retry_after: None,
                };
            }
        }
        LayerOutcome::Pass
    }

    fn check_whitelist(&self, context: &AgentContext, command_name: &str) -> LayerOutcome {
        let Some(patterns) = self.whitelists.get(&(context.role, context.environment)) else {
            return LayerOutcome::Deny {
                reason: DecisionReason::NotWhitelisted,
                message: format!("no allowlist for role {}", context.role),
                retry_after: None,
            };
        };
        if patterns.iter().any(|p| p.matches(command_name)) {
            LayerOutcome::Pass
        } else {
            LayerOutcome::Deny {
                reason: DecisionReason::NotWhitelisted,
                message: format!(
                    "command '{command_name}' is not in the {} allowlist for {}",
                    context.role, context.environment
                ),
                retry_after: None,
            }
        }
    }

    fn check_parameters(
        &self,
        command: &str,
        parameters: &BTreeMap<String, String>,
    ) -> LayerOutcome {
        let report = self.validator.validate(command, parameters);
        let parameter_failures: Vec<String> = report
            .failures
            .iter()
            .filter(|failure| {
                matches!(
                    failure,
                    ValidationFailure::TooManyParameters { .. }
                        | ValidationFailure::ParameterNameTooLong { .. }
                        | ValidationFailure::ParameterValueTooLong { .. }
                        | ValidationFailure::InvalidParameterName { .. }
                )
            })
            .map(ToString::to_string)
            .collect();
        if !parameter_failures.is_empty() {
            return LayerOutcome::Deny {
                reason: DecisionReason::InvalidParameters,
                message: parameter_failures.join("; "),
                retry_after: None,
            };
        }

        if let Some(allowed) = &self.allowed_parameter_names {
            for name in parameters.keys() {
                if !allowed.contains(&name.to_lowercase()) {
                    return LayerOutcome::Deny {
                        reason: DecisionReason::InvalidParameters,
                        message: format!("parameter '{name}' is not accepted"),
                        retry_after: None,
                    };
                }
            }
        }

        for (name, value) in parameters {
            if let Some(rule) = self.parameter_rules.get(&name.to_lowercase()) {
                if !rule.allowed_values.is_empty()
                    && !rule
                        .allowed_values
                        .iter()
                        .any(|allowed| allowed.eq_ignore_ascii_case(value))
                {
                    return LayerOutcome::Deny {
                        reason: DecisionReason::InvalidParameters,
                        message: format!("parameter '{name}' has a value outside its allowed set"),
                        retry_after: None,
                    };
                }
                if let Some(pattern) = &rule.value_pattern {
                    if !pattern.is_match(value) {
                        return LayerOutcome::Deny {
                            reason: DecisionReason::InvalidParameters,
                            message: format!(
                                "parameter '{name}' does not match its required pattern"
                            ),
                            retry_after: None,
                        };
                    }
                }
            }

            let findings = self.injection.detect(value);
            if let Some(finding) = findings.first() {
                return LayerOutcome::Deny {
                    reason: DecisionReason::InvalidParameters,
                    message: format!("parameter '{name}': {}", finding.description),
                    retry_after: None,
                };
            }
        }

        LayerOutcome::Pass
    }

    fn check_semantic(&self, command: &str, parameters: &BTreeMap<String, String>) -> LayerOutcome {
        match self.semantic.analyze(command, parameters) {
            SemanticVerdict::Clean => LayerOutcome::Pass,
            SemanticVerdict::Violation { category, detail } => LayerOutcome::Deny {
                reason: DecisionReason::SemanticViolation,
                message: format!("{category}: {detail}"),
                retry_after: None,
            },
        }
    }

    fn check_context(&self, context: &AgentContext, command: &str) -> LayerOutcome {
        match self.sessions.validate(
            &context.session_id,
            context.role,
            context.environment,
            command,
        ) {
            ContextVerdict::Allowed => LayerOutcome::Pass,
            ContextVerdict::Violation { detail } => LayerOutcome::Deny {
                reason: DecisionReason::ContextViolation,
                message: detail,
                retry_after: None,
            },
        }
    }

    fn check_rate_limit(&self, context: &AgentContext) -> LayerOutcome {
        match self.limiter.check(&context.agent_id, &context.session_id) {
            RateVerdict::Allowed => LayerOutcome::Pass,
            RateVerdict::Limited { retry_after } => LayerOutcome::Deny {
                reason: DecisionReason::RateLimitExceeded,
                message: format!(
                    "rate limit exceeded; retry after {}s",
                    retry_after.as_secs()
                ),
                retry_after: Some(retry_after),
            },
        }
    }

    /// Whether an admitted command still needs a human in the loop.
    fn requires_approval(
        &self,
        role: AutonomyRole,
        environment: Environment,
        command_name: &str,
    ) -> bool {
        match role {
            AutonomyRole::Manual => true,
            AutonomyRole::LimitedWrite
                if WRITE_VERBS.iter().any(|v| command_name.starts_with(v)) =>
            {
                true
            }
            AutonomyRole::Supervised
                if DESTRUCTIVE_VERBS
                    .iter()
                    .any(|v| command_name.starts_with(v)) =>
            {
                true
            }
            _ => {
                environment == Environment::Production
                    && PRODUCTION_HIGH_RISK.contains(&command_name)
            }
        }
    }

    /// Hands the decision to the audit logger. Never blocks; a full
    /// queue drops the event and the logger counts it.
    fn submit_audit(
        &self,
        context: &AgentContext,
        command: &str,
        parameters: &BTreeMap<String, String>,
        decision: &FilterDecision,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };

        let (event_type, severity) = classify_decision(decision);
        let sanitized = self.validator.sanitize(parameters);
        let result = if decision.allowed {
            if decision.requires_approval {
                "allowed_pending_approval".to_string()
            } else {
                "allowed".to_string()
            }
        } else {
            format!("denied:{}", decision.reason)
        };

        let mut event = AuditEvent::new(
            &context.agent_id,
            &context.session_id,
            event_type,
            severity,
        )
        .with_command(command)
        .with_result(result)
        .with_security_context(SecurityContext {
            source_ip: context.source_address.clone(),
            auth_method: None,
            authz_decision: Some(decision.reason.to_string()),
        });
        if !sanitized.is_empty() {
            if let Ok(value) = serde_json::to_value(&sanitized) {
                event = event.with_parameters(value);
            }
        }
        if let Some(user_id) = &context.user_id {
            event = event.with_user(user_id);
        }

        audit.record(event);
    }
}

fn classify_decision(decision: &FilterDecision) -> (EventType, Severity) {
    if decision.allowed {
        return (EventType::CommandEvaluated, Severity::Info);
    }
    match decision.reason {
        DecisionReason::RateLimitExceeded => (EventType::RateLimited, Severity::Warning),
        DecisionReason::InternalError => (EventType::SystemEvent, Severity::Critical),
        DecisionReason::Aborted => (EventType::CommandEvaluated, Severity::Warning),
        DecisionReason::Blacklisted | DecisionReason::SemanticViolation => {
            (EventType::SecurityViolation, Severity::Critical)
        }
        _ => (EventType::SecurityViolation, Severity::Warning),
    }
}

fn compile_denylist(patterns: &[String]) -> Result<Vec<(String, Regex)>> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map(|regex| (pattern.clone(), regex))
                .map_err(|err| {
                    WardenError::Config(format!(
                        "denylist pattern '{pattern}' does not compile: {err}"
                    ))
                })
        })
        .collect()
}

fn compile_parameter_rules(config: &WardenConfig) -> Result<HashMap<String, CompiledParameterRule>> {
    let mut rules = HashMap::new();
    for rule in &config.parameter_rules {
        let value_pattern = match &rule.value_pattern {
            Some(pattern) => Some(Regex::new(pattern).map_err(|err| {
                WardenError::Config(format!(
                    "parameter rule '{}' pattern does not compile: {err}",
                    rule.name
                ))
            })?),
            None => None,
        };
        rules.insert(
            rule.name.to_lowercase(),
            CompiledParameterRule {
                value_pattern,
                allowed_values: rule.allowed_values.clone(),
            },
        );
    }
    Ok(rules)
}

/// Resolves every role's category set, applies environment overrides,
/// and compiles one pattern list per role/environment pair.
fn compile_whitelists(
    config: &WardenConfig,
) -> Result<HashMap<(AutonomyRole, Environment), Vec<CommandPattern>>> {
    let by_role: HashMap<AutonomyRole, &RolePolicy> =
        config.roles.iter().map(|p| (p.role, p)).collect();

    let mut whitelists = HashMap::new();
    for policy in &config.roles {
        let mut visited = HashSet::new();
        let mut patterns = Vec::new();
        collect_role_patterns(config, &by_role, policy.role, &mut visited, &mut patterns)?;

        for environment in [
            Environment::Development,
            Environment::Staging,
            Environment::Production,
            Environment::Isolated,
        ] {
            let mut effective = patterns.clone();
            if let Some(adjustment) = config
                .environment_overrides
                .iter()
                .find(|o| o.environment == environment)
            {
                effective.retain(|pattern| {
                    !adjustment
                        .remove
                        .iter()
                        .any(|removed| removed.eq_ignore_ascii_case(pattern))
                });
                for added in &adjustment.add {
                    if !effective.iter().any(|p| p.eq_ignore_ascii_case(added)) {
                        effective.push(added.clone());
                    }
                }
            }
            let compiled = effective
                .iter()
                .map(|pattern| CommandPattern::compile(pattern))
                .collect();
            whitelists.insert((policy.role, environment), compiled);
        }
    }
    Ok(whitelists)
}

fn collect_role_patterns(
    config: &WardenConfig,
    by_role: &HashMap<AutonomyRole, &RolePolicy>,
    role: AutonomyRole,
    visited: &mut HashSet<AutonomyRole>,
    patterns: &mut Vec<String>,
) -> Result<()> {
    if !visited.insert(role) {
        return Ok(());
    }
    let Some(policy) = by_role.get(&role) else {
        return Err(WardenError::Config(format!(
            "role {role} is inherited but not declared"
        )));
    };
    for inherited in &policy.inherits {
        collect_role_patterns(config, by_role, *inherited, visited, patterns)?;
    }
    for category in &policy.categories {
        let Some(members) = config.command_categories.get(category) else {
            return Err(WardenError::Config(format!(
                "role {role} references unknown category '{category}'"
            )));
        };
        for pattern in members {
            if !patterns.iter().any(|p| p.eq_ignore_ascii_case(pattern)) {
                patterns.push(pattern.clone());
            }
        }
    }
    Ok(())
}
