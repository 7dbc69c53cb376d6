//! Structural validation and advisory sanitization.
//!
//! Every check in [`InputValidator::validate`] runs independently and all
//! failures are collected, so a caller sees the complete set of problems
//! in one pass rather than fixing them one at a time.

use std::collections::BTreeMap;

use crate::models::{InputLimits, ValidationFailure, ValidationReport};

/// Characters stripped from parameter values by [`InputValidator::sanitize`].
const STRIPPED_CHARS: &[char] = &[';', '&', '|', '`', '$'];

/// Structural validator for command text and parameters.
///
/// Validation is deliberately dumb: it knows nothing about policy, roles,
/// or threat intent. It answers one question: is this input well-formed
/// enough to evaluate at all?
///
/// # Example
///
/// ```rust
/// use warden_filter::{InputValidator, InputLimits};
/// use std::collections::BTreeMap;
///
/// let validator = InputValidator::new(InputLimits::new());
/// let report = validator.validate("Get-Process", &BTreeMap::new());
/// assert!(report.ok);
/// ```
#[derive(Debug, Clone)]
pub struct InputValidator {
    limits: InputLimits,
}

impl InputValidator {
    /// Creates a validator with the given limits.
    #[must_use]
    pub const fn new(limits: InputLimits) -> Self {
        Self { limits }
    }

    /// Returns the configured limits.
    #[must_use]
    pub const fn limits(&self) -> &InputLimits {
        &self.limits
    }

    /// Validates command text and parameters, collecting every failure.
    pub fn validate(
        &self,
        command: &str,
        parameters: &BTreeMap<String, String>,
    ) -> ValidationReport {
        let mut failures = Vec::new();

        if command.trim().is_empty() {
            failures.push(ValidationFailure::EmptyCommand);
        }

        if command.len() > self.limits.max_command_length {
            failures.push(ValidationFailure::CommandTooLong {
                length: command.len(),
                max: self.limits.max_command_length,
            });
        }

        self.check_balance(command, &mut failures);
        self.check_control_chars(command, &mut failures);
        self.check_parameters(parameters, &mut failures);

        ValidationReport::from_failures(failures)
    }

    /// Strips shell-significant characters and escapes quotes in every
    /// parameter value.
    ///
    /// This is advisory cleanup for downstream display and transport. It
    /// is NOT a substitute for [`validate`](Self::validate) or injection
    /// detection: a value that needed sanitizing should normally already
    /// have been denied.
    pub fn sanitize(&self, parameters: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        parameters
            .iter()
            .map(|(name, value)| (name.clone(), sanitize_value(value)))
            .collect()
    }

    /// Checks quote and bracket balance.
    ///
    /// Single and double quotes must appear an even number of times;
    /// each bracket pair must open and close the same number of times.
    fn check_balance(&self, command: &str, failures: &mut Vec<ValidationFailure>) {
        for quote in ['"', '\''] {
            let count = command.chars().filter(|&c| c == quote).count();
            if count % 2 != 0 {
                failures.push(ValidationFailure::UnbalancedQuotes { quote });
            }
        }

        for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
            let opens = command.chars().filter(|&c| c == open).count();
            let closes = command.chars().filter(|&c| c == close).count();
            if opens != closes {
                failures.push(ValidationFailure::UnbalancedBrackets { bracket: open });
            }
        }
    }

    /// Rejects NUL bytes and control characters other than tab, LF, CR.
    fn check_control_chars(&self, command: &str, failures: &mut Vec<ValidationFailure>) {
        for ch in command.chars() {
            if ch == '\0' || (ch.is_control() && !matches!(ch, '\t' | '\n' | '\r')) {
                failures.push(ValidationFailure::ControlCharacter {
                    code_point: format!("U+{:04X}", ch as u32),
                });
                // One finding per command is enough; the exact count of
                // embedded control bytes adds no decision value.
                break;
            }
        }
    }

    fn check_parameters(
        &self,
        parameters: &BTreeMap<String, String>,
        failures: &mut Vec<ValidationFailure>,
    ) {
        if parameters.len() > self.limits.max_parameters {
            failures.push(ValidationFailure::TooManyParameters {
                count: parameters.len(),
                max: self.limits.max_parameters,
            });
        }

        for (name, value) in parameters {
            if name.len() > self.limits.max_parameter_name_length {
                failures.push(ValidationFailure::ParameterNameTooLong {
                    name: truncate_name(name),
                    max: self.limits.max_parameter_name_length,
                });
            }

            if value.len() > self.limits.max_parameter_value_length {
                failures.push(ValidationFailure::ParameterValueTooLong {
                    name: truncate_name(name),
                    length: value.len(),
                    max: self.limits.max_parameter_value_length,
                });
            }

            if !is_valid_parameter_name(name) {
                failures.push(ValidationFailure::InvalidParameterName {
                    name: truncate_name(name),
                });
            }
        }
    }
}

/// Parameter names are restricted to `[A-Za-z0-9_.-]` and must be non-empty.
fn is_valid_parameter_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn truncate_name(name: &str) -> String {
    if name.len() > 64 {
        let mut end = 64;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &name[..end])
    } else {
        name.to_string()
    }
}

fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if STRIPPED_CHARS.contains(&ch) || ch == '\0' {
            continue;
        }
        if ch.is_control() && !matches!(ch, '\t' | '\n' | '\r') {
            continue;
        }
        match ch {
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            c => out.push(c),
        }
    }
    out
}
