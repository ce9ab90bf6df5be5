//! Error types for identifier parsing.

use thiserror::Error;

/// Errors from parsing identifiers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    /// A hex string could not be decoded.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// A decoded value had the wrong length.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// An account ID could not be parsed as a decimal number.
    #[error("invalid account ID: {0}")]
    InvalidAccountId(String),
}
