//! Engine configuration.
//!
//! A [`WardenConfig`] is a read-only snapshot: the engine compiles it
//! once at construction and never mutates it. Reload is a new engine
//! built from a new snapshot; in-flight evaluations keep the snapshot
//! they started with.
//!
//! Allowlisting is category-based. Categories group command patterns by
//! functional area (diagnostics, service management, file operations),
//! and each role names the categories it may touch plus the roles it
//! inherits from. Inheritance is an explicit list, so adding or
//! reordering roles cannot silently change who may run what. Verb-level
//! policy (ReadOnly never writes, and so on) is enforced separately by
//! the context layer; the allowlist decides functional reach.

use std::collections::BTreeMap;

use warden_audit::AuditConfig;
use warden_filter::InputLimits;
use warden_session::{AutonomyRole, Environment, RateLimitConfig};

use crate::decision::LayerKind;

/// A role's allowlist membership.
#[derive(Debug, Clone, PartialEq)]
pub struct RolePolicy {
    pub role: AutonomyRole,
    /// Roles whose effective allowlist this role also receives,
    /// resolved transitively.
    pub inherits: Vec<AutonomyRole>,
    /// Category names resolved against [`WardenConfig::command_categories`].
    pub categories: Vec<String>,
}

impl RolePolicy {
    /// Creates a policy with no categories and no inheritance.
    #[must_use]
    pub fn new(role: AutonomyRole) -> Self {
        Self {
            role,
            inherits: Vec::new(),
            categories: Vec::new(),
        }
    }

    /// Sets the inherited roles.
    #[must_use]
    pub fn with_inherits(mut self, inherits: &[AutonomyRole]) -> Self {
        self.inherits = inherits.to_vec();
        self
    }

    /// Sets the category names.
    #[must_use]
    pub fn with_categories(mut self, categories: &[&str]) -> Self {
        self.categories = categories.iter().map(|c| (*c).to_string()).collect();
        self
    }
}

/// Per-environment adjustment of the effective allowlist.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentOverride {
    pub environment: Environment,
    /// Patterns removed from every role's effective allowlist.
    pub remove: Vec<String>,
    /// Patterns added to every role's effective allowlist.
    pub add: Vec<String>,
}

impl EnvironmentOverride {
    /// Creates an override with empty adjustment lists.
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            remove: Vec::new(),
            add: Vec::new(),
        }
    }

    /// Sets the removed patterns.
    #[must_use]
    pub fn with_remove(mut self, remove: &[&str]) -> Self {
        self.remove = remove.iter().map(|p| (*p).to_string()).collect();
        self
    }

    /// Sets the added patterns.
    #[must_use]
    pub fn with_add(mut self, add: &[&str]) -> Self {
        self.add = add.iter().map(|p| (*p).to_string()).collect();
        self
    }
}

/// Value constraints for one named parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRule {
    /// Parameter name, matched case-insensitively.
    pub name: String,
    /// Regex the value must match, when present.
    pub value_pattern: Option<String>,
    /// Enumerated values, when non-empty; matched case-insensitively.
    pub allowed_values: Vec<String>,
}

impl ParameterRule {
    /// Creates an unconstrained rule for a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_pattern: None,
            allowed_values: Vec::new(),
        }
    }

    /// Requires values to match a regex.
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.value_pattern = Some(pattern.into());
        self
    }

    /// Restricts values to an enumerated set.
    #[must_use]
    pub fn with_allowed_values(mut self, values: &[&str]) -> Self {
        self.allowed_values = values.iter().map(|v| (*v).to_string()).collect();
        self
    }
}

/// Complete engine configuration snapshot.
///
/// # Example
///
/// ```rust
/// use warden_core::WardenConfig;
///
/// let config = WardenConfig::new("./audit-logs");
/// assert!(!config.denylist.is_empty());
/// assert_eq!(config.layer_order.len(), 7);
/// ```
#[derive(Debug, Clone)]
pub struct WardenConfig {
    /// Pipeline stages in evaluation order.
    pub layer_order: Vec<LayerKind>,
    /// Regex patterns denied outright, compiled case-insensitive.
    pub denylist: Vec<String>,
    /// Category name to command patterns (exact or suffix-wildcard).
    pub command_categories: BTreeMap<String, Vec<String>>,
    /// Allowlist membership per role.
    pub roles: Vec<RolePolicy>,
    /// Per-environment allowlist adjustments.
    pub environment_overrides: Vec<EnvironmentOverride>,
    /// When present, only these parameter names are accepted.
    pub allowed_parameter_names: Option<Vec<String>>,
    /// Per-parameter value constraints.
    pub parameter_rules: Vec<ParameterRule>,
    /// Token bucket and sliding window parameters.
    pub rate_limits: RateLimitConfig,
    /// Structural input constraints.
    pub input_limits: InputLimits,
    /// Audit directory, rotation, retention, and redaction settings.
    pub audit: AuditConfig,
}

impl WardenConfig {
    /// Creates the default configuration with audit files under
    /// `audit_dir`.
    #[must_use]
    pub fn new(audit_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            layer_order: default_layer_order(),
            denylist: default_denylist(),
            command_categories: default_categories(),
            roles: default_roles(),
            environment_overrides: default_overrides(),
            allowed_parameter_names: None,
            parameter_rules: Vec::new(),
            rate_limits: RateLimitConfig::new(),
            input_limits: InputLimits::new(),
            audit: AuditConfig::new(audit_dir),
        }
    }

    /// Replaces the pipeline order.
    #[must_use]
    pub fn with_layer_order(mut self, layer_order: Vec<LayerKind>) -> Self {
        self.layer_order = layer_order;
        self
    }

    /// Replaces the denylist.
    #[must_use]
    pub fn with_denylist(mut self, patterns: &[&str]) -> Self {
        self.denylist = patterns.iter().map(|p| (*p).to_string()).collect();
        self
    }

    /// Replaces the category table.
    #[must_use]
    pub fn with_categories(mut self, categories: BTreeMap<String, Vec<String>>) -> Self {
        self.command_categories = categories;
        self
    }

    /// Replaces the role policies.
    #[must_use]
    pub fn with_roles(mut self, roles: Vec<RolePolicy>) -> Self {
        self.roles = roles;
        self
    }

    /// Replaces the environment overrides.
    #[must_use]
    pub fn with_environment_overrides(mut self, overrides: Vec<EnvironmentOverride>) -> Self {
        self.environment_overrides = overrides;
        self
    }

    /// Restricts accepted parameter names.
    #[must_use]
    pub fn with_allowed_parameter_names(mut self, names: &[&str]) -> Self {
        self.allowed_parameter_names = Some(names.iter().map(|n| (*n).to_string()).collect());
        self
    }

    /// Adds per-parameter value rules.
    #[must_use]
    pub fn with_parameter_rules(mut self, rules: Vec<ParameterRule>) -> Self {
        self.parameter_rules = rules;
        self
    }

    /// Sets the rate limit parameters.
    #[must_use]
    pub fn with_rate_limits(mut self, rate_limits: RateLimitConfig) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    /// Sets the input constraints.
    #[must_use]
    pub fn with_input_limits(mut self, input_limits: InputLimits) -> Self {
        self.input_limits = input_limits;
        self
    }

    /// Sets the audit configuration.
    #[must_use]
    pub fn with_audit(mut self, audit: AuditConfig) -> Self {
        self.audit = audit;
        self
    }
}

/// Default pipeline order: cheap structural checks first, stateful
/// layers last so denied commands never consume rate tokens.
#[must_use]
pub fn default_layer_order() -> Vec<LayerKind> {
    vec![
        LayerKind::Syntax,
        LayerKind::Blacklist,
        LayerKind::Whitelist,
        LayerKind::Parameters,
        LayerKind::Semantic,
        LayerKind::Context,
        LayerKind::RateLimit,
    ]
}

fn default_denylist() -> Vec<String> {
    [
        r"rm\s+-rf\s+/",
        r"del\s+/[fsq]",
        r"format\s+c:",
        r"mkfs\.",
        r"dd\s+if=/dev/(zero|u?random)",
        r"drop\s+(database|table)",
        r"invoke-expression.*downloadstring",
        r"shutdown\s+(/s|-h|now)",
        r":\(\)\s*\{\s*:\|:&\s*\};:",
    ]
    .iter()
    .map(|p| (*p).to_string())
    .collect()
}

fn default_categories() -> BTreeMap<String, Vec<String>> {
    let mut categories = BTreeMap::new();
    let mut insert = |name: &str, patterns: &[&str]| {
        categories.insert(
            name.to_string(),
            patterns.iter().map(|p| (*p).to_string()).collect(),
        );
    };

    insert(
        "diagnostics",
        &[
            "Get-*",
            "Read-*",
            "Show-*",
            "Find-*",
            "Measure-*",
            "Test-*",
            "Resolve-*",
        ],
    );
    insert(
        "service_management",
        &[
            "Get-Service",
            "Set-Service",
            "Start-Service",
            "Stop-Service",
            "Restart-Service",
            "New-Service",
        ],
    );
    insert(
        "process_management",
        &["Get-Process", "Start-Process", "Stop-Process", "Wait-Process"],
    );
    insert(
        "file_operations",
        &[
            "Get-Item",
            "Get-ChildItem",
            "Get-Content",
            "Set-Content",
            "Add-Content",
            "Copy-Item",
            "Move-Item",
            "New-Item",
            "Remove-Item",
        ],
    );
    insert(
        "configuration",
        &[
            "Set-*", "New-*", "Add-*", "Update-*", "Write-*", "Out-*", "Export-*", "Import-*",
        ],
    );
    insert(
        "system_administration",
        &[
            "Remove-*",
            "Delete-*",
            "Clear-*",
            "Stop-*",
            "Disable-*",
            "Enable-*",
            "Restart-*",
            "Install-*",
            "Uninstall-*",
            "Invoke-Command",
        ],
    );
    insert("everything", &["*"]);

    categories
}

fn default_roles() -> Vec<RolePolicy> {
    vec![
        // Manual reaches everything; the human approves each command.
        RolePolicy::new(AutonomyRole::Manual).with_categories(&["everything"]),
        RolePolicy::new(AutonomyRole::ReadOnly).with_categories(&[
            "diagnostics",
            "service_management",
            "process_management",
            "file_operations",
        ]),
        RolePolicy::new(AutonomyRole::LimitedWrite)
            .with_inherits(&[AutonomyRole::ReadOnly])
            .with_categories(&["configuration"]),
        RolePolicy::new(AutonomyRole::Supervised)
            .with_inherits(&[AutonomyRole::LimitedWrite])
            .with_categories(&["system_administration"]),
        RolePolicy::new(AutonomyRole::FullAutonomy)
            .with_inherits(&[AutonomyRole::Supervised])
            .with_categories(&["everything"]),
    ]
}

fn default_overrides() -> Vec<EnvironmentOverride> {
    vec![EnvironmentOverride::new(Environment::Production)
        .with_remove(&["Test-*", "Measure-*", "Resolve-*"])]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_shape() {
        let config = WardenConfig::new("./audit");
        assert_eq!(config.layer_order, default_layer_order());
        assert_eq!(config.roles.len(), 5);
        assert!(config.command_categories.contains_key("diagnostics"));
        assert!(config.environment_overrides.iter().any(|o| o.environment == Environment::Production));
    }

    #[test]
    fn test_role_inheritance_chain_is_explicit() {
        let config = WardenConfig::new("./audit");
        let supervised = config
            .roles
            .iter()
            .find(|r| r.role == AutonomyRole::Supervised)
            .unwrap();
        assert_eq!(supervised.inherits, vec![AutonomyRole::LimitedWrite]);
    }

    #[test]
    fn test_builders_replace_sections() {
        let config = WardenConfig::new("./audit")
            .with_denylist(&["foo"])
            .with_allowed_parameter_names(&["Name", "Path"]);
        assert_eq!(config.denylist, vec!["foo".to_string()]);
        assert_eq!(
            config.allowed_parameter_names,
            Some(vec!["Name".to_string(), "Path".to_string()])
        );
    }

    #[test]
    fn test_parameter_rule_builder() {
        let rule = ParameterRule::new("Status")
            .with_allowed_values(&["Running", "Stopped"])
            .with_pattern("^[A-Za-z]+$");
        assert_eq!(rule.allowed_values.len(), 2);
        assert!(rule.value_pattern.is_some());
    }
}
