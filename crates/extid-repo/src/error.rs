//! Error types for repository operations.

use extid_types::ObjectId;
use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepoError {
    /// An object referenced by ID does not exist in the store.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// An object exists but cannot be decoded as the expected kind.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A compare-and-swap ref update lost the race: the ref moved since it
    /// was read. The caller may retry its whole load-mutate-commit cycle.
    #[error("lock failure on {name}: expected {expected}, found {actual}")]
    LockFailure {
        name: String,
        expected: ObjectId,
        actual: ObjectId,
    },

    /// A ref update failed for a reason other than a lost race. Not
    /// retryable.
    #[error("ref update rejected on {name}: {reason}")]
    RefUpdateRejected { name: String, reason: String },

    /// No repository is registered under the requested name.
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// I/O error from a backing store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepoError {
    /// Returns `true` for the single retryable condition: a lost
    /// compare-and-swap race on a ref update.
    pub fn is_lock_failure(&self) -> bool {
        matches!(self, Self::LockFailure { .. })
    }
}

/// Convenience type alias for repository operations.
pub type RepoResult<T> = std::result::Result<T, RepoError>;
