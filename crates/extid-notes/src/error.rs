use extid_cache::CacheError;
use extid_model::ModelError;
use extid_repo::RepoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotesError {
    /// The store has not materialized a note map yet; callers must `load`
    /// before reading or staging.
    #[error("external IDs not loaded yet")]
    NotLoaded,

    /// Staging would create a second record under an existing key.
    #[error("external ID {0} already exists")]
    DuplicateKey(String),

    /// A staged mutation contradicts the stored state, such as deleting a
    /// record that does not match what is on disk.
    #[error("{0}")]
    InvariantViolation(String),

    /// The store was opened read-only.
    #[error("external IDs are read-only")]
    UpdatesDisabled,

    /// Reads were explicitly disabled for this reader.
    #[error("external ID reading is disabled")]
    ReadsDisabled,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl NotesError {
    /// Only a lost compare-and-swap on the branch ref is worth retrying;
    /// everything else is fatal to the attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Repo(e) if e.is_lock_failure())
    }
}

pub type NotesResult<T> = std::result::Result<T, NotesError>;
