//! Mutation-free access to the identities branch.

use std::sync::atomic::{AtomicBool, Ordering};

use extid_model::{parse_note, ExternalId, ExternalIdKey, KeyFactory};
use extid_repo::{NoteMap, NotesRepo, REFS_EXTERNAL_IDS};
use extid_types::ObjectId;
use tracing::error;

use crate::error::{NotesError, NotesResult};

/// Read-only external ID access, usable without a load-mutate-commit
/// cycle.
///
/// Reads can be switched off at runtime, for migrations that must make
/// every accidental read fail loudly instead of serving data.
pub struct ExternalIdReader {
    repo: NotesRepo,
    key_factory: KeyFactory,
    fail_on_load: AtomicBool,
}

impl ExternalIdReader {
    pub fn new(repo: NotesRepo, key_factory: KeyFactory) -> Self {
        Self {
            repo,
            key_factory,
            fail_on_load: AtomicBool::new(false),
        }
    }

    pub fn set_fail_on_load(&self, fail: bool) {
        self.fail_on_load.store(fail, Ordering::Relaxed);
    }

    fn check_enabled(&self) -> NotesResult<()> {
        if self.fail_on_load.load(Ordering::Relaxed) {
            return Err(NotesError::ReadsDisabled);
        }
        Ok(())
    }

    /// The live branch revision; zero if the branch does not exist.
    pub fn read_revision(&self) -> NotesResult<ObjectId> {
        self.check_enabled()?;
        Ok(self.repo.resolve(REFS_EXTERNAL_IDS)?)
    }

    /// Every parseable record at the live revision.
    pub fn all(&self) -> NotesResult<Vec<ExternalId>> {
        let rev = self.read_revision()?;
        self.all_at(rev)
    }

    /// Every parseable record at a revision; the zero revision yields the
    /// empty set. Corrupt notes are logged and skipped.
    pub fn all_at(&self, rev: ObjectId) -> NotesResult<Vec<ExternalId>> {
        self.check_enabled()?;
        let notes = NoteMap::read(&self.repo, rev)?;
        let mut ids = Vec::with_capacity(notes.len());
        for (note_id, blob_id) in notes.iter() {
            let raw = self.repo.read_blob(blob_id)?;
            match parse_note(&note_id.to_hex(), &raw, *blob_id) {
                Ok(ext_id) => ids.push(ext_id),
                Err(e) => error!(note = %note_id, "skipping invalid external ID note: {e}"),
            }
        }
        Ok(ids)
    }

    /// Point lookup at the live revision.
    pub fn get(&self, key: &ExternalIdKey) -> NotesResult<Option<ExternalId>> {
        let rev = self.read_revision()?;
        self.get_at(key, rev)
    }

    /// Point lookup at a revision. Absent branch or absent note is `None`;
    /// corrupt note content is an error.
    pub fn get_at(&self, key: &ExternalIdKey, rev: ObjectId) -> NotesResult<Option<ExternalId>> {
        self.check_enabled()?;
        let notes = NoteMap::read(&self.repo, rev)?;
        for note_id in self.key_factory.candidate_note_ids(key) {
            if let Some(blob_id) = notes.get(&note_id) {
                let raw = self.repo.read_blob(&blob_id)?;
                let ext_id = parse_note(&note_id.to_hex(), &raw, blob_id)?;
                return Ok(Some(ext_id));
            }
        }
        Ok(None)
    }
}
