use extid_repo::RepoError;
use extid_types::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Reads were explicitly disabled for this context; failing loudly
    /// beats silently serving stale or empty data.
    #[error("external ID reads are disabled")]
    ReadsDisabled,

    /// The identities branch holds strictly linear history; a merge commit
    /// means something else wrote to it.
    #[error("merge commit {0} on the external IDs branch")]
    MergeCommit(ObjectId),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;
