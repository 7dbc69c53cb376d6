//! Injection and path-traversal detection.
//!
//! A fixed battery of compiled patterns screens raw text for shell
//! injection techniques and filesystem traversal. The battery is built
//! once at construction and shared read-only; patterns never change at
//! runtime.
//!
//! ## Threat Model
//!
//! Agent-proposed commands arrive as free text. An attacker who can
//! influence command generation (through prompt injection upstream, or a
//! compromised agent) will try to smuggle a second command into an
//! innocuous-looking one:
//!
//! - chaining (`;`, `&&`, `|`) into destructive verbs
//! - substitution (`$(...)`, backticks) to hide execution
//! - redirection into system paths to corrupt host state
//! - encoded payloads that pass plain-text screening
//! - traversal sequences to escape an intended directory scope

use regex::Regex;

use crate::evasion;
use crate::models::{InjectionKind, InjectionMatch};

/// One entry in the detection battery.
struct ScreenPattern {
    pattern: Regex,
    kind: InjectionKind,
    description: &'static str,
}

/// Detector for injection techniques and path traversal.
///
/// # Example
///
/// ```rust
/// use warden_filter::InjectionDetector;
///
/// let detector = InjectionDetector::new();
/// assert!(detector.detect("Get-Process").is_empty());
/// assert!(!detector.detect("ls; rm -rf /").is_empty());
/// ```
pub struct InjectionDetector {
    patterns: Vec<ScreenPattern>,
}

impl InjectionDetector {
    /// Creates a detector with the full built-in battery.
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: Self::build_patterns(),
        }
    }

    /// Builds the fixed pattern battery.
    ///
    /// Order matters only for reporting: earlier entries appear first in
    /// the findings list. Every pattern is tested; detection does not
    /// short-circuit.
    fn build_patterns() -> Vec<ScreenPattern> {
        vec![
            ScreenPattern {
                pattern: Regex::new(r"\$\(|<\(").unwrap(),
                kind: InjectionKind::CommandSubstitution,
                description: "command or process substitution",
            },
            ScreenPattern {
                pattern: Regex::new(r"`[^`]*`").unwrap(),
                kind: InjectionKind::BacktickExecution,
                description: "backtick command execution",
            },
            ScreenPattern {
                pattern: Regex::new(
                    r"(?i)(;|&&|\|\||\|)\s*(rm|del|erase|format|shutdown|reboot|mkfs|dd|rd)\b",
                )
                .unwrap(),
                kind: InjectionKind::DestructiveChaining,
                description: "operator chaining into a destructive verb",
            },
            ScreenPattern {
                pattern: Regex::new(
                    r#"(?i)>{1,2}\s*(/etc/|/bin/|/sbin/|/usr/|/boot/|[a-z]:\\windows\\|[a-z]:\\program files)"#,
                )
                .unwrap(),
                kind: InjectionKind::SystemPathRedirection,
                description: "redirection into a system path",
            },
            ScreenPattern {
                pattern: Regex::new(r"\$\{[A-Za-z_][A-Za-z0-9_]*\}|\$[A-Za-z_][A-Za-z0-9_]*|%[A-Za-z_][A-Za-z0-9_]*%").unwrap(),
                kind: InjectionKind::EnvironmentExpansion,
                description: "environment variable expansion",
            },
            ScreenPattern {
                pattern: Regex::new(r"<<-?\s*['\x22]?\w+").unwrap(),
                kind: InjectionKind::HereDocument,
                description: "here-document payload",
            },
            // Bare metacharacters come last: the more specific chaining
            // patterns above already classify the dangerous uses.
            ScreenPattern {
                pattern: Regex::new(r"[;&|]").unwrap(),
                kind: InjectionKind::ShellMetacharacters,
                description: "shell metacharacter",
            },
            ScreenPattern {
                pattern: Regex::new(r"\.\./|\.\.\\").unwrap(),
                kind: InjectionKind::PathTraversal,
                description: "relative directory traversal",
            },
            ScreenPattern {
                pattern: Regex::new(r"(?i)^(/|[a-z]:\\)|\s(/etc/|/root/|[a-z]:\\windows\\)").unwrap(),
                kind: InjectionKind::PathTraversal,
                description: "absolute path reference",
            },
            ScreenPattern {
                pattern: Regex::new(r"(^|\s)~[/\\]").unwrap(),
                kind: InjectionKind::PathTraversal,
                description: "home directory reference",
            },
            ScreenPattern {
                pattern: Regex::new(r"\\\\[A-Za-z0-9_.-]+\\[A-Za-z0-9$_.-]+").unwrap(),
                kind: InjectionKind::PathTraversal,
                description: "UNC share reference",
            },
        ]
    }

    /// Screens text against the full battery plus encoding-evasion
    /// analysis. Returns every finding.
    pub fn detect(&self, text: &str) -> Vec<InjectionMatch> {
        let mut matches = Vec::new();

        for entry in &self.patterns {
            if let Some(found) = entry.pattern.find(text) {
                matches.push(InjectionMatch::new(
                    entry.kind,
                    entry.description,
                    found.as_str(),
                ));
            }
        }

        // Decoded payloads are re-screened against the same battery so an
        // encoder cannot hide what plain text would have caught.
        for decoded in evasion::decode_candidates(text) {
            if self
                .patterns
                .iter()
                .any(|entry| entry.pattern.is_match(&decoded.text))
                || evasion::looks_dangerous(&decoded.text)
            {
                matches.push(InjectionMatch::new(
                    InjectionKind::EncodedPayload,
                    decoded.encoding,
                    &decoded.text,
                ));
            }
        }

        matches
    }

    /// Convenience check for path traversal only, used by parameter
    /// validation where a bare value like `../../etc/passwd` carries no
    /// other shell syntax.
    pub fn detect_traversal(&self, text: &str) -> Vec<InjectionMatch> {
        self.patterns
            .iter()
            .filter(|entry| entry.kind == InjectionKind::PathTraversal)
            .filter_map(|entry| {
                entry.pattern.find(text).map(|found| {
                    InjectionMatch::new(entry.kind, entry.description, found.as_str())
                })
            })
            .collect()
    }
}

impl Default for InjectionDetector {
    fn default() -> Self {
        Self::new()
    }
}
