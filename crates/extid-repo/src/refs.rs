//! The [`RefDatabase`] trait defining named ref storage with
//! compare-and-swap updates.

use extid_types::ObjectId;

use crate::error::RepoResult;

/// The branch holding the external-ID note map.
pub const REFS_EXTERNAL_IDS: &str = "refs/meta/external-ids";

/// Storage backend for named refs.
///
/// Implementations must be thread-safe (`Send + Sync`). The single mutation
/// primitive is a compare-and-swap: an update succeeds only if the ref's
/// current value equals the expected prior value. A lost race must be
/// reported as [`crate::RepoError::LockFailure`], distinct from any other
/// failure, so callers can retry their whole load-mutate-commit cycle.
pub trait RefDatabase: Send + Sync {
    /// Resolve a ref by name.
    ///
    /// Returns the zero object ID if the ref does not exist.
    fn resolve(&self, name: &str) -> RepoResult<ObjectId>;

    /// Atomically update a ref from `expected` to `new`.
    ///
    /// `expected` equal to the zero object ID means "the ref must not exist
    /// yet" (creation). Any mismatch between `expected` and the ref's
    /// current value fails with a lock failure.
    fn compare_and_swap(
        &self,
        name: &str,
        expected: ObjectId,
        new: ObjectId,
    ) -> RepoResult<()>;
}
