//! The note map: a sorted note-ID → blob-ID mapping materialized from a
//! note tree.
//!
//! Note IDs are the content hashes of external-ID keys; entry names in the
//! stored tree are their hex encodings. The namespace is flat by
//! construction.

use std::collections::BTreeMap;

use extid_types::ObjectId;

use crate::error::{RepoError, RepoResult};
use crate::repo::NotesRepo;
use crate::store::NoteTree;

/// Sorted mapping from note ID to the blob holding that note's content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NoteMap {
    entries: BTreeMap<ObjectId, ObjectId>,
}

impl NoteMap {
    /// Create an empty note map.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Materialize the note map at a branch revision.
    ///
    /// A zero revision yields an empty map (the branch does not exist yet).
    pub fn read(repo: &NotesRepo, rev: ObjectId) -> RepoResult<Self> {
        if rev.is_zero() {
            return Ok(Self::empty());
        }
        let commit = repo.read_commit(&rev)?;
        Self::from_tree(repo, &commit.tree)
    }

    /// Materialize the note map from a tree object.
    pub fn from_tree(repo: &NotesRepo, tree_id: &ObjectId) -> RepoResult<Self> {
        let tree = repo.read_tree(tree_id)?;
        let mut entries = BTreeMap::new();
        for (name, blob_id) in &tree.entries {
            let note_id = ObjectId::from_hex(name).map_err(|e| RepoError::CorruptObject {
                id: *tree_id,
                reason: format!("bad note name {name}: {e}"),
            })?;
            entries.insert(note_id, *blob_id);
        }
        Ok(Self { entries })
    }

    /// Returns `true` if a note exists for this note ID.
    pub fn contains(&self, note_id: &ObjectId) -> bool {
        self.entries.contains_key(note_id)
    }

    /// The blob ID for a note, if present.
    pub fn get(&self, note_id: &ObjectId) -> Option<ObjectId> {
        self.entries.get(note_id).copied()
    }

    /// Insert or overwrite a note.
    pub fn set(&mut self, note_id: ObjectId, blob_id: ObjectId) {
        self.entries.insert(note_id, blob_id);
    }

    /// Remove a note. Returns the blob ID it pointed at, if any.
    pub fn remove(&mut self, note_id: &ObjectId) -> Option<ObjectId> {
        self.entries.remove(note_id)
    }

    /// Iterate over `(note_id, blob_id)` pairs in note-ID order.
    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &ObjectId)> {
        self.entries.iter()
    }

    /// Number of notes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no notes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the map out as a note tree; returns the tree's ID.
    pub fn write_tree(&self, repo: &NotesRepo) -> RepoResult<ObjectId> {
        let entries = self
            .entries
            .iter()
            .map(|(note_id, blob_id)| (note_id.to_hex(), *blob_id))
            .collect();
        repo.write_tree(&NoteTree::new(entries))
    }
}
