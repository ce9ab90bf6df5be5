//! Snapshot materialization, differential where possible.
//!
//! Loading the aggregate for a revision by scanning every note is
//! O(total identities); on a busy installation most reloads follow a
//! commit that touched a handful of notes. The loader therefore walks the
//! first-parent history looking for a revision whose snapshot is still
//! cached and, on a hit, rebuilds the target from that ancestor plus a
//! flat tree diff. A bounded walk with no hit falls back to the full scan;
//! the fallback is the correctness path and is never skipped.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use extid_model::parse_note;
use extid_repo::{diff_note_trees, Commit, NoteDiffEntry, NoteMap, NotesRepo};
use extid_types::ObjectId;
use tracing::{debug, error, warn};

use crate::cache::SnapshotCache;
use crate::error::{CacheError, CacheResult};
use crate::metrics;
use crate::snapshot::AllExternalIds;

/// How many first-parent steps to probe for a cached ancestor before
/// giving up and scanning the whole branch. A safety valve against
/// unbounded walks on a cold cache.
pub const MAX_HISTORY_WALK: usize = 10;

/// Computes [`AllExternalIds`] snapshots and owns the revision-keyed cache
/// they are stored in.
pub struct ExternalIdCacheLoader {
    snapshots: SnapshotCache,
    /// Persistent cache configurations are not expected to be cold, so a
    /// full-reload fallback warns instead of logging at debug.
    persistent: bool,
}

impl ExternalIdCacheLoader {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: SnapshotCache::new(capacity),
            persistent: false,
        }
    }

    pub fn persistent(capacity: usize) -> Self {
        Self {
            snapshots: SnapshotCache::new(capacity),
            persistent: true,
        }
    }

    pub fn snapshots(&self) -> &SnapshotCache {
        &self.snapshots
    }

    /// Get-or-compute the snapshot for `rev`, caching the result.
    ///
    /// The zero revision (branch absent) yields an empty snapshot. Two
    /// threads may compute the same revision concurrently; the duplicate
    /// work is harmless.
    pub fn load(&self, repo: &NotesRepo, rev: ObjectId) -> CacheResult<Arc<AllExternalIds>> {
        if rev.is_zero() {
            return Ok(Arc::new(AllExternalIds::empty()));
        }
        if let Some(hit) = self.snapshots.get(&rev) {
            return Ok(hit);
        }
        let snapshot = self.compute(repo, rev)?;
        self.snapshots.insert(rev, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    fn compute(&self, repo: &NotesRepo, rev: ObjectId) -> CacheResult<Arc<AllExternalIds>> {
        let tip = repo.read_commit(&rev)?;
        if tip.parents.len() > 1 {
            return Err(CacheError::MergeCommit(rev));
        }

        match self.find_cached_ancestor(repo, &tip)? {
            Some((ancestor_rev, ancestor_snapshot, ancestor)) => {
                let started = Instant::now();
                let snapshot =
                    self.apply_diff(repo, &ancestor_snapshot, &ancestor.tree, &tip.tree)?;
                metrics::differential_reload(started.elapsed().as_secs_f64());
                debug!(
                    ancestor = %ancestor_rev,
                    target = %rev,
                    "differential external ID snapshot reload"
                );
                Ok(snapshot)
            }
            None => {
                if self.persistent {
                    warn!(
                        target_rev = %rev,
                        lookback = MAX_HISTORY_WALK,
                        "no cached ancestor found, falling back to full external ID reload"
                    );
                } else {
                    debug!(target_rev = %rev, "full external ID reload");
                }
                self.load_full(repo, &tip)
            }
        }
    }

    /// Probe the snapshot cache at each of the first `MAX_HISTORY_WALK`
    /// ancestors of `tip`, nearest first.
    fn find_cached_ancestor(
        &self,
        repo: &NotesRepo,
        tip: &Commit,
    ) -> CacheResult<Option<(ObjectId, Arc<AllExternalIds>, Commit)>> {
        let mut next = tip.first_parent();
        for _ in 0..MAX_HISTORY_WALK {
            let Some(rev) = next else {
                return Ok(None);
            };
            let commit = repo.read_commit(&rev)?;
            if commit.parents.len() > 1 {
                return Err(CacheError::MergeCommit(rev));
            }
            if let Some(snapshot) = self.snapshots.get(&rev) {
                return Ok(Some((rev, snapshot, commit)));
            }
            next = commit.first_parent();
        }
        Ok(None)
    }

    fn apply_diff(
        &self,
        repo: &NotesRepo,
        ancestor: &AllExternalIds,
        old_tree: &ObjectId,
        new_tree: &ObjectId,
    ) -> CacheResult<Arc<AllExternalIds>> {
        let mut removed_blobs = HashSet::new();
        let mut added_notes = Vec::new();
        for entry in diff_note_trees(repo, Some(old_tree), new_tree)? {
            match entry {
                NoteDiffEntry::Added { note_id, blob_id } => {
                    added_notes.push((note_id, blob_id));
                }
                NoteDiffEntry::Removed { blob_id, .. } => {
                    removed_blobs.insert(blob_id);
                }
                NoteDiffEntry::Modified {
                    note_id,
                    old_blob_id,
                    new_blob_id,
                } => {
                    removed_blobs.insert(old_blob_id);
                    added_notes.push((note_id, new_blob_id));
                }
            }
        }

        let mut added = Vec::with_capacity(added_notes.len());
        for (note_id, blob_id) in added_notes {
            let raw = repo.read_blob(&blob_id)?;
            match parse_note(&note_id.to_hex(), &raw, blob_id) {
                Ok(ext_id) => added.push(ext_id),
                // Best-effort aggregate: a corrupt note loses one record,
                // not the whole reload.
                Err(e) => error!(note = %note_id, "skipping invalid external ID note: {e}"),
            }
        }
        Ok(Arc::new(ancestor.apply(&removed_blobs, added)))
    }

    fn load_full(&self, repo: &NotesRepo, tip: &Commit) -> CacheResult<Arc<AllExternalIds>> {
        metrics::full_reload();
        let notes = NoteMap::from_tree(repo, &tip.tree)?;
        let mut ids = Vec::with_capacity(notes.len());
        for (note_id, blob_id) in notes.iter() {
            let raw = repo.read_blob(blob_id)?;
            match parse_note(&note_id.to_hex(), &raw, *blob_id) {
                Ok(ext_id) => ids.push(ext_id),
                Err(e) => error!(note = %note_id, "skipping invalid external ID note: {e}"),
            }
        }
        Ok(Arc::new(AllExternalIds::build(ids)))
    }
}
