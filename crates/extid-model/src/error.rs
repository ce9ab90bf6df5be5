//! Error types for external-ID value handling.

use thiserror::Error;

/// Errors from key construction and note parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// A scheme contained the reserved `:` separator.
    #[error("invalid scheme, must not contain ':': {0}")]
    InvalidScheme(String),

    /// A persisted note could not be parsed as an external ID.
    #[error("invalid external ID note {note}: {reason}")]
    InvalidNote { note: String, reason: String },
}

/// Convenience type alias for model operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;
