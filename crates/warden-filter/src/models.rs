//! # Core Types for the Input Validator
//!
//! This module defines the data types used throughout the validator for
//! structural failures, injection findings, and limits configuration.
//!
//! ## Design Principles
//!
//! 1. **Collected Failures** - Structural validation reports every problem
//!    found, never just the first one. Callers see the complete picture.
//! 2. **Closed Taxonomy** - Every injection finding maps to a named
//!    [`InjectionKind`] variant with a stable serialized name.
//! 3. **Serializable** - All types derive Serde traits so findings can be
//!    carried into audit records unchanged.

use serde::{Deserialize, Serialize};

/// Categories of injection techniques the detector screens for.
///
/// | Variant | Technique |
/// |---------|-----------|
/// | `ShellMetacharacters` | `;`, `&`, `\|` chaining |
/// | `CommandSubstitution` | `$(...)` / `<(...)` |
/// | `BacktickExecution` | `` `...` `` |
/// | `DestructiveChaining` | `&& rm`, `; del`, `\| format` |
/// | `SystemPathRedirection` | `> /etc/...`, `>> C:\Windows\...` |
/// | `EnvironmentExpansion` | `$VAR`, `${VAR}`, `%VAR%` |
/// | `HereDocument` | `<<EOF` payload smuggling |
/// | `EncodedPayload` | base64/hex/url/unicode blob hiding a dangerous pattern |
/// | `PathTraversal` | `../`, absolute paths, `~/`, UNC shares |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionKind {
    /// Shell metacharacter chaining.
    ShellMetacharacters,
    /// Command or process substitution.
    CommandSubstitution,
    /// Backtick command execution.
    BacktickExecution,
    /// Logical-operator chaining into a destructive verb.
    DestructiveChaining,
    /// Redirection into a system path.
    SystemPathRedirection,
    /// Environment variable expansion.
    EnvironmentExpansion,
    /// Here-document payload.
    HereDocument,
    /// Encoded blob that decodes to a dangerous pattern.
    EncodedPayload,
    /// Directory traversal or absolute/UNC path reference.
    PathTraversal,
}

impl std::fmt::Display for InjectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ShellMetacharacters => "shell metacharacters",
            Self::CommandSubstitution => "command substitution",
            Self::BacktickExecution => "backtick execution",
            Self::DestructiveChaining => "destructive chaining",
            Self::SystemPathRedirection => "system path redirection",
            Self::EnvironmentExpansion => "environment expansion",
            Self::HereDocument => "here-document",
            Self::EncodedPayload => "encoded payload",
            Self::PathTraversal => "path traversal",
        };
        f.write_str(name)
    }
}

/// A single injection finding produced by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionMatch {
    /// The technique category that matched.
    pub kind: InjectionKind,
    /// Short description of what matched.
    pub description: String,
    /// The matched fragment, truncated for safe logging.
    pub fragment: String,
}

impl InjectionMatch {
    /// Maximum fragment length retained in a finding.
    ///
    /// Findings travel into audit records; an attacker-controlled
    /// multi-kilobyte payload must not ride along verbatim.
    pub const MAX_FRAGMENT: usize = 64;

    pub(crate) fn new(kind: InjectionKind, description: &str, fragment: &str) -> Self {
        let fragment = if fragment.len() > Self::MAX_FRAGMENT {
            let mut end = Self::MAX_FRAGMENT;
            while !fragment.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &fragment[..end])
        } else {
            fragment.to_string()
        };
        Self {
            kind,
            description: description.to_string(),
            fragment,
        }
    }
}

/// A single structural validation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ValidationFailure {
    /// Command is missing or blank. Always critical.
    EmptyCommand,
    /// Command text exceeds the configured maximum length.
    CommandTooLong {
        /// Observed length in bytes.
        length: usize,
        /// Configured maximum.
        max: usize,
    },
    /// Quote characters are not balanced.
    UnbalancedQuotes {
        /// The offending quote character.
        quote: char,
    },
    /// Bracket characters are not balanced.
    UnbalancedBrackets {
        /// The offending opening bracket.
        bracket: char,
    },
    /// Command contains a NUL byte or disallowed control character.
    ControlCharacter {
        /// The code point found, rendered as `U+XXXX`.
        code_point: String,
    },
    /// More parameters supplied than allowed.
    TooManyParameters {
        /// Observed count.
        count: usize,
        /// Configured maximum.
        max: usize,
    },
    /// A parameter name exceeds the configured maximum length.
    ParameterNameTooLong {
        /// The offending parameter name (truncated).
        name: String,
        /// Configured maximum.
        max: usize,
    },
    /// A parameter value exceeds the configured maximum length.
    ParameterValueTooLong {
        /// The owning parameter name.
        name: String,
        /// Observed length.
        length: usize,
        /// Configured maximum.
        max: usize,
    },
    /// A parameter name contains characters outside `[A-Za-z0-9_.-]`.
    InvalidParameterName {
        /// The offending parameter name (truncated).
        name: String,
    },
}

impl ValidationFailure {
    /// Returns true for failures that indicate the input cannot be
    /// meaningfully processed at all.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::EmptyCommand | Self::ControlCharacter { .. })
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCommand => write!(f, "command is empty"),
            Self::CommandTooLong { length, max } => {
                write!(f, "command length {} exceeds maximum {}", length, max)
            }
            Self::UnbalancedQuotes { quote } => {
                write!(f, "unbalanced {} quote", quote)
            }
            Self::UnbalancedBrackets { bracket } => {
                write!(f, "unbalanced '{}' bracket", bracket)
            }
            Self::ControlCharacter { code_point } => {
                write!(f, "disallowed control character {}", code_point)
            }
            Self::TooManyParameters { count, max } => {
                write!(f, "{} parameters exceeds maximum {}", count, max)
            }
            Self::ParameterNameTooLong { name, max } => {
                write!(f, "parameter name '{}' exceeds maximum length {}", name, max)
            }
            Self::ParameterValueTooLong { name, length, max } => {
                write!(
                    f,
                    "parameter '{}' value length {} exceeds maximum {}",
                    name, length, max
                )
            }
            Self::InvalidParameterName { name } => {
                write!(f, "parameter name '{}' contains invalid characters", name)
            }
        }
    }
}

/// The complete result of structural validation.
///
/// All checks run independently; `failures` carries every problem found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True when no failure was recorded.
    pub ok: bool,
    /// Every failure found, in check order.
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    pub(crate) fn from_failures(failures: Vec<ValidationFailure>) -> Self {
        Self {
            ok: failures.is_empty(),
            failures,
        }
    }

    /// Renders all failures as one semicolon-joined message.
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Size and shape limits enforced by the validator.
///
/// # Example
///
/// ```rust
/// use warden_filter::InputLimits;
///
/// let limits = InputLimits::new()
///     .with_max_command_length(2048)
///     .with_max_parameters(16);
/// assert_eq!(limits.max_command_length, 2048);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputLimits {
    /// Maximum command text length in bytes.
    pub max_command_length: usize,
    /// Maximum number of parameters per call.
    pub max_parameters: usize,
    /// Maximum parameter name length in bytes.
    pub max_parameter_name_length: usize,
    /// Maximum parameter value length in bytes.
    pub max_parameter_value_length: usize,
}

impl InputLimits {
    /// Creates limits with defaults: 8192-byte commands, 32 parameters,
    /// 128-byte names, 4096-byte values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_command_length: 8192,
            max_parameters: 32,
            max_parameter_name_length: 128,
            max_parameter_value_length: 4096,
        }
    }

    /// Sets the maximum command length.
    #[must_use]
    pub const fn with_max_command_length(mut self, max: usize) -> Self {
        self.max_command_length = max;
        self
    }

    /// Sets the maximum parameter count.
    #[must_use]
    pub const fn with_max_parameters(mut self, max: usize) -> Self {
        self.max_parameters = max;
        self
    }

    /// Sets the maximum parameter name length.
    #[must_use]
    pub const fn with_max_parameter_name_length(mut self, max: usize) -> Self {
        self.max_parameter_name_length = max;
        self
    }

    /// Sets the maximum parameter value length.
    #[must_use]
    pub const fn with_max_parameter_value_length(mut self, max: usize) -> Self {
        self.max_parameter_value_length = max;
        self
    }
}

impl Default for InputLimits {
    fn default() -> Self {
        Self::new()
    }
}
