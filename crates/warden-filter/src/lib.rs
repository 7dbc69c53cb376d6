//! # Warden Filter - Input Validator
//!
//! Structural and lexical screening for agent-proposed commands. This is
//! the first gate in the admission pipeline: it decides whether raw input
//! is well-formed and free of injection techniques before any policy
//! layer spends time on it.
//!
//! ## Capabilities
//!
//! 1. **Structural Validation** - Length limits, quote and bracket
//!    balance, control-character rejection, and parameter shape checks.
//!    Every failure is collected so callers see the full picture in one
//!    pass.
//!
//! 2. **Injection Detection** - A fixed battery of compiled patterns
//!    screens for shell metacharacters, command substitution, destructive
//!    chaining, redirection into system paths, here-documents, and
//!    environment expansion.
//!
//! 3. **Encoding-Evasion Analysis** - Base64, hex, percent, unicode and
//!    HTML-entity blobs are decoded and re-screened, so wrapping a
//!    payload in an encoder gains an attacker nothing.
//!
//! 4. **Path Traversal Detection** - Relative traversal, absolute system
//!    paths, home-directory references, and UNC shares.
//!
//! ## Threat Model
//!
//! | Threat | Example | Defense |
//! |--------|---------|---------|
//! | Command chaining | `ls; rm -rf /` | Metacharacter + chaining patterns |
//! | Hidden execution | `` echo `id` ``, `$(whoami)` | Substitution patterns |
//! | Host corruption | `echo x > /etc/passwd` | Redirection patterns |
//! | Encoded payloads | `bHM7IHJtIC1yZiAv` | Decode and re-screen |
//! | Scope escape | `../../etc/passwd` | Traversal patterns |
//! | Parser confusion | unbalanced quotes, NUL bytes | Structural validation |
//!
//! ## Usage
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use warden_filter::{InjectionDetector, InputLimits, InputValidator};
//!
//! let validator = InputValidator::new(InputLimits::new());
//! let detector = InjectionDetector::new();
//!
//! let report = validator.validate("Get-Process -Name w3wp", &BTreeMap::new());
//! assert!(report.ok);
//!
//! let findings = detector.detect("ls; rm -rf /");
//! assert!(!findings.is_empty());
//! ```

mod evasion;
pub mod injection;
pub mod models;
pub mod validator;

pub use injection::InjectionDetector;
pub use models::{
    InjectionKind, InjectionMatch, InputLimits, ValidationFailure, ValidationReport,
};
pub use validator::InputValidator;
