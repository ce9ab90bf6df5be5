//! Flat tree diff between two revisions of the note namespace.
//!
//! The note namespace is flat, so the diff is a straight comparison of two
//! sorted maps with no rename detection. A modification is reported with
//! both blob IDs so callers can treat it as remove-old + add-new.

use extid_types::ObjectId;

use crate::error::RepoResult;
use crate::notemap::NoteMap;
use crate::repo::NotesRepo;

/// A single changed note between two trees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NoteDiffEntry {
    /// The note is absent in the old tree and present in the new one.
    Added {
        note_id: ObjectId,
        blob_id: ObjectId,
    },
    /// The note is present in the old tree and absent in the new one.
    Removed {
        note_id: ObjectId,
        blob_id: ObjectId,
    },
    /// The note is present in both trees with different blobs.
    Modified {
        note_id: ObjectId,
        old_blob_id: ObjectId,
        new_blob_id: ObjectId,
    },
}

/// Compare the note trees of two revisions, restricted to changed entries.
///
/// `old_tree` of `None` diffs against the empty tree (bootstrap case).
pub fn diff_note_trees(
    repo: &NotesRepo,
    old_tree: Option<&ObjectId>,
    new_tree: &ObjectId,
) -> RepoResult<Vec<NoteDiffEntry>> {
    let old = match old_tree {
        Some(id) => NoteMap::from_tree(repo, id)?,
        None => NoteMap::empty(),
    };
    let new = NoteMap::from_tree(repo, new_tree)?;
    Ok(diff_note_maps(&old, &new))
}

/// Compare two materialized note maps.
pub fn diff_note_maps(old: &NoteMap, new: &NoteMap) -> Vec<NoteDiffEntry> {
    let mut changes = Vec::new();

    for (note_id, old_blob) in old.iter() {
        match new.get(note_id) {
            Some(new_blob) if new_blob != *old_blob => {
                changes.push(NoteDiffEntry::Modified {
                    note_id: *note_id,
                    old_blob_id: *old_blob,
                    new_blob_id: new_blob,
                });
            }
            Some(_) => {}
            None => {
                changes.push(NoteDiffEntry::Removed {
                    note_id: *note_id,
                    blob_id: *old_blob,
                });
            }
        }
    }

    for (note_id, new_blob) in new.iter() {
        if !old.contains(note_id) {
            changes.push(NoteDiffEntry::Added {
                note_id: *note_id,
                blob_id: *new_blob,
            });
        }
    }

    changes
}
