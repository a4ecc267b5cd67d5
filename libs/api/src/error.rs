//! Error types for decoding and validating resources.

use thiserror::Error;

/// Errors that can occur when handling resources.
#[derive(Debug, Error, Clone)]
pub enum ApiError {
    /// The object does not carry `apiVersion` and `kind`.
    #[error("object is missing apiVersion or kind")]
    MissingTypeMeta,

    /// The `apiVersion`/`kind` pair is not registered in the scheme.
    #[error("unknown kind: {api_version}, Kind={kind}")]
    UnknownKind { api_version: String, kind: String },

    /// The object failed validation.
    #[error("invalid {kind} {name}: {reason}")]
    Invalid {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Serialization(err.to_string())
    }
}
