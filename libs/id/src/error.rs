//! Error types for identity parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating identities.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input string is empty.
    #[error("identifier cannot be empty")]
    Empty,

    /// The UID has an invalid prefix.
    #[error("invalid UID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The UID is missing the underscore separator.
    #[error("UID missing underscore separator")]
    MissingSeparator,

    /// The ULID portion of the UID is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),

    /// An object key is not of the form `namespace/name`.
    #[error("invalid object key '{0}': expected 'namespace/name'")]
    InvalidKey(String),

    /// A name or namespace violates the naming rules.
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// A resource version is not a decimal counter.
    #[error("invalid resource version: {0}")]
    InvalidResourceVersion(String),
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    /// Returns true if this error came from object key parsing.
    pub fn is_key_error(&self) -> bool {
        matches!(self, IdError::InvalidKey(_) | IdError::InvalidName { .. })
    }
}
