use extid_cache::CacheError;
use extid_repo::RepoError;
use extid_types::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaintError {
    /// A merge commit on the identities branch is a data error, not a
    /// condition to recover from.
    #[error("merge commit {0} on the external IDs branch")]
    MergeCommit(ObjectId),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub type MaintResult<T> = std::result::Result<T, MaintError>;
