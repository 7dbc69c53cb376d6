//! # Warden Semantic - Threat Intent Analyzer
//!
//! Pattern-based detection of threat intent in agent-proposed commands.
//! Where the input validator asks "is this text well-formed and free of
//! injection syntax", this crate asks "does this command, taken at face
//! value, do something an attacker would want".
//!
//! ## Detection Strategy
//!
//! 1. **Category Patterns** - One compiled case-insensitive regex per
//!    named threat category. Command text and every parameter value are
//!    screened; the first match denies, naming the category.
//!
//! 2. **Combination Rules** - Coarse substring co-occurrence checks over
//!    raw command text. A download primitive next to an execute
//!    primitive is suspicious even when each half alone is routine.
//!    Rules are policy data and can be replaced wholesale by callers.
//!
//! ## Threat Taxonomy
//!
//! | Category | Example |
//! |----------|---------|
//! | Privilege escalation | `sudo`, `Set-ExecutionPolicy`, group changes |
//! | Lateral movement | `Enter-PSSession`, `psexec`, `wmic /node` |
//! | Data exfiltration | `curl --upload-file`, `scp` to remote |
//! | Credential theft | `mimikatz`, `lsass`, SAM hive export |
//! | Obfuscation | `-EncodedCommand`, `FromBase64String`, `IEX(` |
//! | Persistence | `schtasks /create`, run-key writes, `crontab` |
//! | Destructive operation | `rm -rf /`, `vssadmin delete shadows` |
//! | Remote code execution | `DownloadString`, `curl \| sh` |
//!
//! ## Usage
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use warden_semantic::{SemanticAnalyzer, SemanticVerdict};
//!
//! let analyzer = SemanticAnalyzer::new();
//! match analyzer.analyze("Invoke-Expression $payload", &BTreeMap::new()) {
//!     SemanticVerdict::Clean => println!("no threat intent found"),
//!     SemanticVerdict::Violation { category, detail } => {
//!         println!("denied: {} ({})", category, detail);
//!     }
//! }
//! ```

pub mod analyzer;
pub mod models;

pub use analyzer::SemanticAnalyzer;
pub use models::{CombinationRule, SemanticVerdict, ThreatCategory};
