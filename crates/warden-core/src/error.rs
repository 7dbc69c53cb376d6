//! Error taxonomy for the admission engine.
//!
//! Policy outcomes are never errors: a denied command is a normal,
//! typed [`FilterDecision`](crate::decision::FilterDecision). Errors
//! are reserved for contract violations at the call boundary and for
//! configurations that cannot be compiled.

/// Errors returned by engine construction and evaluation.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// The caller submitted an empty or whitespace-only command.
    #[error("command is empty")]
    EmptyCommand,

    /// A required context field was blank.
    #[error("agent context is missing {field}")]
    IncompleteContext { field: &'static str },

    /// The configuration could not be compiled into an engine.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Convenience alias for engine operations.
pub type Result<T> = std::result::Result<T, WardenError>;
