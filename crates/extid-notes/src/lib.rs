//! The transactional write path for external IDs.
//!
//! [`ExternalIdNotes`] presents one load-mutate-commit cycle over the
//! identities branch: mutations are staged, invariant-checked, and applied
//! atomically by `commit`, which advances the branch ref with a
//! compare-and-swap. [`ExternalIdsUpdater`] wraps the whole cycle in a
//! retry loop that re-runs it when another writer advanced the tip first.
//! [`ExternalIdReader`] is the mutation-free counterpart.

pub mod error;
pub mod metrics;
pub mod notes;
pub mod reader;
pub mod updater;

pub use error::{NotesError, NotesResult};
pub use notes::{update_caches, AccountIndexSink, CommitOutcome, ExternalIdNotes};
pub use reader::ExternalIdReader;
pub use updater::{ExternalIdsUpdater, RetryPolicy};
