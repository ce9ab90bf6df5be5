//! Versioned object repository for the external-ID engine.
//!
//! This crate provides the append-only commit-graph key/value store the
//! notes layer is built on:
//! - [`ObjectStore`] trait boundary + [`InMemoryObjectStore`] implementation
//! - Blob / tree / commit object types with content-addressed IDs
//! - [`RefDatabase`] with compare-and-swap ref updates that report lock
//!   failures distinctly from other failures
//! - [`NoteMap`], the flat note-name → blob mapping stored as a tree
//! - [`diff_note_trees`], a flat tree diff (no rename detection)
//! - [`NotesRepo`], the facade bundling objects and refs for one repository

pub mod commit;
pub mod diff;
pub mod error;
pub mod memory;
pub mod notemap;
pub mod refs;
pub mod repo;
pub mod store;

pub use commit::{Commit, Ident};
pub use diff::{diff_note_trees, NoteDiffEntry};
pub use error::{RepoError, RepoResult};
pub use memory::{InMemoryObjectStore, InMemoryRefDatabase};
pub use notemap::NoteMap;
pub use refs::{RefDatabase, REFS_EXTERNAL_IDS};
pub use repo::{InMemoryRepoManager, NotesRepo, RepoManager};
pub use store::{Blob, NoteTree, ObjectKind, ObjectStore, StoredObject};
