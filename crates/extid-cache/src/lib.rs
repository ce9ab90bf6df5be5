//! Revision-keyed caching for external IDs.
//!
//! The unit of caching is an [`AllExternalIds`] snapshot: every identity on
//! the branch at one revision, indexed by key, account, and email. Reads
//! resolve the live branch revision and look up that snapshot; misses go
//! through [`ExternalIdCacheLoader`], which prefers reconstructing the
//! snapshot from a cached ancestor plus a tree diff over a full scan.

pub mod cache;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod snapshot;

pub use cache::{DisabledExternalIdCache, ExternalIdCache, ExternalIdCacheImpl, SnapshotCache};
pub use error::{CacheError, CacheResult};
pub use loader::{ExternalIdCacheLoader, MAX_HISTORY_WALK};
pub use snapshot::AllExternalIds;
