//! The staged, single-cycle view over the identities branch.

use std::collections::{BTreeSet, HashSet};

use extid_cache::ExternalIdCache;
use extid_model::{parse_note, render_note, ExternalId, ExternalIdKey, KeyFactory};
use extid_repo::{Commit, Ident, NoteMap, NotesRepo, REFS_EXTERNAL_IDS};
use extid_types::{AccountId, ObjectId};
use tracing::error;

use crate::error::{NotesError, NotesResult};
use crate::metrics;

/// One staged mutation. Staging validates what it can against the loaded
/// state; the rest is checked when the command is applied at commit time.
enum StagedUpdate {
    Insert(Vec<ExternalId>),
    Upsert(Vec<ExternalId>),
    Delete(Vec<ExternalId>),
    DeleteByKeys {
        expected_account: Option<AccountId>,
        keys: Vec<ExternalIdKey>,
    },
    Replace {
        /// When set, deletes are account-scoped and adds must belong to
        /// this account.
        account: Option<AccountId>,
        delete: Vec<ExternalIdKey>,
        add: Vec<ExternalId>,
    },
}

struct Loaded {
    rev: ObjectId,
    notes: NoteMap,
}

/// Result of [`ExternalIdNotes::commit`].
#[derive(Clone, Debug)]
pub enum CommitOutcome {
    Committed {
        old_rev: ObjectId,
        new_rev: ObjectId,
        /// Records removed by this commit, with their prior blob IDs.
        removed: Vec<ExternalId>,
        /// Records added by this commit, with their new blob IDs.
        added: Vec<ExternalId>,
    },
    /// The staged mutations produced a tree identical to the base
    /// revision's, so nothing was written.
    NoChanges { rev: ObjectId },
}

/// A transactional view over the identities branch for one
/// load-mutate-commit cycle.
///
/// Mutations are staged against the revision `load` materialized and only
/// applied by `commit`, which writes the new tree and advances the branch
/// ref with a compare-and-swap against that base revision. A concurrent
/// writer advancing the tip first makes `commit` fail with a lock failure;
/// the caller re-runs the whole cycle (see
/// [`ExternalIdsUpdater`](crate::updater::ExternalIdsUpdater)).
pub struct ExternalIdNotes {
    repo: NotesRepo,
    key_factory: KeyFactory,
    state: Option<Loaded>,
    staged: Vec<StagedUpdate>,
    /// Note IDs staged for addition, for duplicate checks before commit.
    pending_adds: HashSet<ObjectId>,
    read_only: bool,
}

impl ExternalIdNotes {
    pub fn new(repo: NotesRepo, key_factory: KeyFactory) -> Self {
        Self {
            repo,
            key_factory,
            state: None,
            staged: Vec::new(),
            pending_adds: HashSet::new(),
            read_only: false,
        }
    }

    /// Materialize the note map from the live branch revision.
    pub fn load(&mut self) -> NotesResult<&mut Self> {
        let rev = self.repo.resolve(REFS_EXTERNAL_IDS)?;
        self.load_at(rev)
    }

    /// Materialize the note map from a specific revision. The zero
    /// revision loads the empty state.
    pub fn load_at(&mut self, rev: ObjectId) -> NotesResult<&mut Self> {
        let notes = NoteMap::read(&self.repo, rev)?;
        self.state = Some(Loaded { rev, notes });
        self.staged.clear();
        self.pending_adds.clear();
        Ok(self)
    }

    /// Reject all further staging. Used by tooling that wants the read
    /// surface without any chance of writing.
    pub fn set_read_only(&mut self) {
        self.read_only = true;
    }

    /// The revision this store loaded from, updated after each commit.
    pub fn loaded_rev(&self) -> NotesResult<ObjectId> {
        Ok(self.loaded()?.rev)
    }

    fn loaded(&self) -> NotesResult<&Loaded> {
        self.state.as_ref().ok_or(NotesError::NotLoaded)
    }

    fn check_mutable(&self) -> NotesResult<&Loaded> {
        if self.read_only {
            return Err(NotesError::UpdatesDisabled);
        }
        self.loaded()
    }

    // --- reads ---------------------------------------------------------

    /// Point lookup. Probes both note-ID variants of the key so lookups
    /// survive a case-sensitivity policy migration. Corrupt note content
    /// is an error here, unlike in bulk reads.
    pub fn get(&self, key: &ExternalIdKey) -> NotesResult<Option<ExternalId>> {
        let loaded = self.loaded()?;
        for note_id in self.key_factory.candidate_note_ids(key) {
            if let Some(blob_id) = loaded.notes.get(&note_id) {
                let raw = self.repo.read_blob(&blob_id)?;
                let ext_id = parse_note(&note_id.to_hex(), &raw, blob_id)?;
                return Ok(Some(ext_id));
            }
        }
        Ok(None)
    }

    /// Bulk point lookup; missing keys are simply absent from the result.
    pub fn get_many<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a ExternalIdKey>,
    ) -> NotesResult<Vec<ExternalId>> {
        let mut found = Vec::new();
        for key in keys {
            if let Some(ext_id) = self.get(key)? {
                found.push(ext_id);
            }
        }
        Ok(found)
    }

    /// Every parseable record in the loaded state. Corrupt notes are
    /// logged and skipped.
    pub fn all(&self) -> NotesResult<Vec<ExternalId>> {
        let loaded = self.loaded()?;
        let mut ids = Vec::with_capacity(loaded.notes.len());
        for (note_id, blob_id) in loaded.notes.iter() {
            let raw = self.repo.read_blob(blob_id)?;
            match parse_note(&note_id.to_hex(), &raw, *blob_id) {
                Ok(ext_id) => ids.push(ext_id),
                Err(e) => error!(note = %note_id, "skipping invalid external ID note: {e}"),
            }
        }
        Ok(ids)
    }

    // --- staging -------------------------------------------------------

    /// Stage creation of new records. Fails if any key already exists in
    /// the loaded state or in an earlier staged addition; nothing is
    /// staged on failure.
    pub fn insert(&mut self, ids: Vec<ExternalId>) -> NotesResult<()> {
        let loaded = self.check_mutable()?;
        let mut batch = HashSet::new();
        for ext_id in &ids {
            let note_id = self.key_factory.note_id(ext_id.key());
            let exists = self
                .key_factory
                .candidate_note_ids(ext_id.key())
                .iter()
                .any(|id| loaded.notes.contains(id));
            if exists || self.pending_adds.contains(&note_id) || !batch.insert(note_id) {
                return Err(NotesError::DuplicateKey(ext_id.key().serialize()));
            }
        }
        self.pending_adds.extend(batch);
        self.staged.push(StagedUpdate::Insert(ids));
        Ok(())
    }

    /// Stage create-or-overwrite of records.
    pub fn upsert(&mut self, ids: Vec<ExternalId>) -> NotesResult<()> {
        self.check_mutable()?;
        for ext_id in &ids {
            self.pending_adds.insert(self.key_factory.note_id(ext_id.key()));
        }
        self.staged.push(StagedUpdate::Upsert(ids));
        Ok(())
    }

    /// Stage removal by full record. At commit time the stored record must
    /// equal the given one (blob ID excluded), otherwise the commit fails
    /// with an invariant violation. Absent keys are a no-op.
    pub fn delete(&mut self, ids: Vec<ExternalId>) -> NotesResult<()> {
        self.check_mutable()?;
        self.staged.push(StagedUpdate::Delete(ids));
        Ok(())
    }

    /// Stage removal by key, scoped to an account. At commit time a key
    /// stored under a different account fails the commit.
    pub fn delete_keys(&mut self, account: AccountId, keys: Vec<ExternalIdKey>) -> NotesResult<()> {
        self.check_mutable()?;
        self.staged.push(StagedUpdate::DeleteByKeys {
            expected_account: Some(account),
            keys,
        });
        Ok(())
    }

    /// Stage removal by key regardless of owning account.
    pub fn delete_by_keys(&mut self, keys: Vec<ExternalIdKey>) -> NotesResult<()> {
        self.check_mutable()?;
        self.staged.push(StagedUpdate::DeleteByKeys {
            expected_account: None,
            keys,
        });
        Ok(())
    }

    /// Stage an atomic delete-then-add for one account. Every added record
    /// must belong to `account`, and net-new keys (adds not covered by a
    /// delete in this same call) must not already exist.
    pub fn replace(
        &mut self,
        account: AccountId,
        to_delete: Vec<ExternalIdKey>,
        to_add: Vec<ExternalId>,
    ) -> NotesResult<()> {
        self.check_mutable()?;
        for ext_id in &to_add {
            if ext_id.account_id() != account {
                return Err(NotesError::InvariantViolation(format!(
                    "external ID {} belongs to account {}, expected {}",
                    ext_id.key().serialize(),
                    ext_id.account_id(),
                    account
                )));
            }
        }
        self.stage_replace(Some(account), to_delete, to_add)
    }

    /// Stage a delete-then-add without account scoping; the deletes remove
    /// whatever account's records hold the keys.
    pub fn replace_by_keys(
        &mut self,
        to_delete: Vec<ExternalIdKey>,
        to_add: Vec<ExternalId>,
    ) -> NotesResult<()> {
        self.stage_replace(None, to_delete, to_add)
    }

    fn stage_replace(
        &mut self,
        account: Option<AccountId>,
        to_delete: Vec<ExternalIdKey>,
        to_add: Vec<ExternalId>,
    ) -> NotesResult<()> {
        let loaded = self.check_mutable()?;
        let deleted_note_ids: HashSet<ObjectId> = to_delete
            .iter()
            .map(|k| self.key_factory.note_id(k))
            .collect();
        for ext_id in &to_add {
            let note_id = self.key_factory.note_id(ext_id.key());
            if deleted_note_ids.contains(&note_id) {
                continue;
            }
            let exists = self
                .key_factory
                .candidate_note_ids(ext_id.key())
                .iter()
                .any(|id| loaded.notes.contains(id));
            if exists || self.pending_adds.contains(&note_id) {
                return Err(NotesError::DuplicateKey(ext_id.key().serialize()));
            }
        }

        for ext_id in &to_add {
            self.pending_adds.insert(self.key_factory.note_id(ext_id.key()));
        }
        self.staged.push(StagedUpdate::Replace {
            account,
            delete: to_delete,
            add: to_add,
        });
        Ok(())
    }

    // --- commit --------------------------------------------------------

    /// Apply the staged mutations, write the resulting tree and commit,
    /// and advance the branch ref with a compare-and-swap against the
    /// loaded revision. On success the store is positioned at the new
    /// revision with nothing staged.
    pub fn commit(&mut self, committer: Ident, message: &str) -> NotesResult<CommitOutcome> {
        let loaded = self.loaded()?;
        let old_rev = loaded.rev;

        let mut notes = loaded.notes.clone();
        let mut removed = Vec::new();
        let mut added = Vec::new();
        for update in &self.staged {
            self.apply(update, &mut notes, &mut removed, &mut added)?;
        }

        let new_tree = notes.write_tree(&self.repo)?;
        let unchanged = if old_rev.is_zero() {
            notes.is_empty()
        } else {
            self.repo.read_commit(&old_rev)?.tree == new_tree
        };
        if unchanged {
            self.staged.clear();
            self.pending_adds.clear();
            return Ok(CommitOutcome::NoChanges { rev: old_rev });
        }

        let commit = Commit {
            tree: new_tree,
            parents: if old_rev.is_zero() {
                Vec::new()
            } else {
                vec![old_rev]
            },
            author: committer.clone(),
            committer,
            message: build_message(message, &removed, &added),
        };
        let new_rev = self.repo.write_commit(&commit)?;
        self.repo.update_ref(REFS_EXTERNAL_IDS, old_rev, new_rev)?;
        metrics::update_committed();

        self.state = Some(Loaded {
            rev: new_rev,
            notes,
        });
        self.staged.clear();
        self.pending_adds.clear();
        Ok(CommitOutcome::Committed {
            old_rev,
            new_rev,
            removed,
            added,
        })
    }

    fn apply(
        &self,
        update: &StagedUpdate,
        notes: &mut NoteMap,
        removed: &mut Vec<ExternalId>,
        added: &mut Vec<ExternalId>,
    ) -> NotesResult<()> {
        match update {
            StagedUpdate::Insert(ids) => {
                for ext_id in ids {
                    self.apply_add(notes, ext_id, false, removed, added)?;
                }
            }
            StagedUpdate::Upsert(ids) => {
                for ext_id in ids {
                    self.apply_add(notes, ext_id, true, removed, added)?;
                }
            }
            StagedUpdate::Delete(ids) => {
                for ext_id in ids {
                    self.apply_delete(notes, ext_id.key(), Some(ext_id), None, removed)?;
                }
            }
            StagedUpdate::DeleteByKeys {
                expected_account,
                keys,
            } => {
                for key in keys {
                    self.apply_delete(notes, key, None, *expected_account, removed)?;
                }
            }
            StagedUpdate::Replace {
                account,
                delete,
                add,
            } => {
                // Deletes first, so delete+add of one key is a true
                // replace rather than a stale overwrite.
                for key in delete {
                    self.apply_delete(notes, key, None, *account, removed)?;
                }
                for ext_id in add {
                    self.apply_add(notes, ext_id, true, removed, added)?;
                }
            }
        }
        Ok(())
    }

    fn apply_add(
        &self,
        notes: &mut NoteMap,
        ext_id: &ExternalId,
        overwrite: bool,
        removed: &mut Vec<ExternalId>,
        added: &mut Vec<ExternalId>,
    ) -> NotesResult<()> {
        let note_id = self.key_factory.note_id(ext_id.key());

        // Probe both note-ID variants; an existing note found under the
        // non-current variant is migrated to the current one.
        let mut prior: Option<(ObjectId, Vec<u8>)> = None;
        for candidate in self.key_factory.candidate_note_ids(ext_id.key()) {
            if let Some(blob_id) = notes.get(&candidate) {
                if !overwrite {
                    return Err(NotesError::DuplicateKey(ext_id.key().serialize()));
                }
                prior = Some((candidate, self.repo.read_blob(&blob_id)?));
                break;
            }
        }

        let note_hex = note_id.to_hex();
        let raw = match &prior {
            Some((prior_note_id, prior_raw)) => {
                let prior_blob = notes
                    .remove(prior_note_id)
                    .unwrap_or_else(ObjectId::zero);
                match parse_note(&prior_note_id.to_hex(), prior_raw, prior_blob) {
                    Ok(old) => removed.push(old),
                    Err(e) => {
                        error!(note = %prior_note_id, "overwriting invalid external ID note: {e}")
                    }
                }
                render_note(&note_hex, ext_id, Some(prior_raw.as_slice()))?
            }
            None => render_note(&note_hex, ext_id, None)?,
        };

        let blob_id = self.repo.write_blob(&raw)?;
        notes.set(note_id, blob_id);
        added.push(ext_id.clone().with_blob_id(blob_id));
        Ok(())
    }

    /// Remove one key. `expected` (full-record match) and
    /// `expected_account` guard against deleting state other than what the
    /// caller believes is stored. A key with no note is a no-op.
    fn apply_delete(
        &self,
        notes: &mut NoteMap,
        key: &ExternalIdKey,
        expected: Option<&ExternalId>,
        expected_account: Option<AccountId>,
        removed: &mut Vec<ExternalId>,
    ) -> NotesResult<()> {
        for note_id in self.key_factory.candidate_note_ids(key) {
            let Some(blob_id) = notes.get(&note_id) else {
                continue;
            };
            let raw = self.repo.read_blob(&blob_id)?;
            let stored = parse_note(&note_id.to_hex(), &raw, blob_id)?;

            if let Some(expected) = expected {
                if stored != *expected {
                    return Err(NotesError::InvariantViolation(format!(
                        "external ID {} does not match stored state",
                        expected.key().serialize()
                    )));
                }
            }
            if let Some(account) = expected_account {
                if stored.account_id() != account {
                    return Err(NotesError::InvariantViolation(format!(
                        "external ID {} belongs to account {}, expected {}",
                        key.serialize(),
                        stored.account_id(),
                        account
                    )));
                }
            }

            notes.remove(&note_id);
            removed.push(stored);
            return Ok(());
        }
        Ok(())
    }
}

/// Append footers naming the affected accounts and emails, so branch
/// history is auditable without parsing trees.
fn build_message(message: &str, removed: &[ExternalId], added: &[ExternalId]) -> String {
    let accounts: BTreeSet<AccountId> = removed
        .iter()
        .chain(added)
        .map(|e| e.account_id())
        .collect();
    let emails: BTreeSet<&str> = removed
        .iter()
        .chain(added)
        .filter_map(|e| e.email())
        .collect();

    if accounts.is_empty() && emails.is_empty() {
        return message.to_string();
    }
    let mut out = format!("{message}\n");
    for account in accounts {
        out.push_str(&format!("\nAccount: {account}"));
    }
    for email in emails {
        out.push_str(&format!("\nEmail: {email}"));
    }
    out
}

/// Post-commit fan-out. Replays a commit's effect into the snapshot cache
/// and evicts/reindexes every affected account, minus a skip list for
/// callers that already handled some accounts themselves.
pub fn update_caches(
    cache: &dyn ExternalIdCache,
    index: &dyn AccountIndexSink,
    outcome: &CommitOutcome,
    skip_reindex: &[AccountId],
) -> NotesResult<()> {
    let CommitOutcome::Committed {
        old_rev,
        new_rev,
        removed,
        added,
    } = outcome
    else {
        return Ok(());
    };

    cache.on_replace(*old_rev, *new_rev, removed, added)?;

    let accounts: BTreeSet<AccountId> = removed
        .iter()
        .chain(added)
        .map(|e| e.account_id())
        .collect();
    for account in accounts {
        if skip_reindex.contains(&account) {
            continue;
        }
        index.evict(account);
        index.index(account);
    }
    Ok(())
}

/// Eviction/reindex hooks for downstream per-account caches.
pub trait AccountIndexSink: Send + Sync {
    fn evict(&self, account: AccountId);
    fn index(&self, account: AccountId);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use extid_model::scheme;
    use extid_repo::RepoError;
    use std::sync::Mutex;

    fn committer() -> Ident {
        Ident::new("Identity Service", "identities@service.example", Utc::now())
    }

    fn store() -> ExternalIdNotes {
        let mut notes = ExternalIdNotes::new(NotesRepo::in_memory(), KeyFactory::new(false));
        notes.load().unwrap();
        notes
    }

    fn key(scheme_name: &str, id: &str) -> ExternalIdKey {
        ExternalIdKey::create(Some(scheme_name), id).unwrap()
    }

    fn ext_id(scheme_name: &str, id: &str, account: u32) -> ExternalId {
        ExternalId::new(key(scheme_name, id), AccountId::new(account))
    }

    #[test]
    fn unloaded_store_fails_fast() {
        let mut notes = ExternalIdNotes::new(NotesRepo::in_memory(), KeyFactory::new(false));
        assert!(matches!(
            notes.get(&key(scheme::USERNAME, "jdoe")),
            Err(NotesError::NotLoaded)
        ));
        assert!(matches!(
            notes.insert(vec![ext_id(scheme::USERNAME, "jdoe", 1)]),
            Err(NotesError::NotLoaded)
        ));
        assert!(matches!(
            notes.commit(committer(), "x"),
            Err(NotesError::NotLoaded)
        ));
    }

    #[test]
    fn insert_commit_get_roundtrip() {
        let mut notes = store();
        let username = ext_id(scheme::USERNAME, "jdoe", 1003407);
        let mailto = ext_id(scheme::MAILTO, "jdoe@example.com", 1003407)
            .with_email("jdoe@example.com");
        notes
            .insert(vec![username.clone(), mailto.clone()])
            .unwrap();
        let outcome = notes.commit(committer(), "Create account").unwrap();

        let CommitOutcome::Committed {
            old_rev,
            new_rev,
            removed,
            added,
        } = outcome
        else {
            panic!("expected a commit");
        };
        assert!(old_rev.is_zero());
        assert!(!new_rev.is_zero());
        assert!(removed.is_empty());
        assert_eq!(added.len(), 2);
        assert!(added.iter().all(|e| e.blob_id().is_some()));

        assert_eq!(notes.get(username.key()).unwrap(), Some(username.clone()));
        assert_eq!(
            notes.get_many([username.key(), mailto.key()]).unwrap().len(),
            2
        );
        assert_eq!(notes.all().unwrap().len(), 2);
    }

    #[test]
    fn insert_duplicate_key_is_rejected() {
        let mut notes = store();
        notes.insert(vec![ext_id(scheme::USERNAME, "jdoe", 1)]).unwrap();
        notes.commit(committer(), "create").unwrap();

        // Against committed state.
        let err = notes
            .insert(vec![ext_id(scheme::USERNAME, "jdoe", 2)])
            .unwrap_err();
        assert!(matches!(err, NotesError::DuplicateKey(k) if k == "username:jdoe"));

        // Against a pending staged insert.
        notes.insert(vec![ext_id(scheme::UUID, "u1", 2)]).unwrap();
        assert!(notes.insert(vec![ext_id(scheme::UUID, "u1", 3)]).is_err());

        // Within one batch.
        assert!(notes
            .insert(vec![
                ext_id(scheme::EXTERNAL, "x", 1),
                ext_id(scheme::EXTERNAL, "x", 1)
            ])
            .is_err());
    }

    #[test]
    fn upsert_overwrites_and_reports_both_records() {
        let mut notes = store();
        let old = ext_id(scheme::USERNAME, "jdoe", 1).with_email("old@example.com");
        notes.insert(vec![old.clone()]).unwrap();
        notes.commit(committer(), "create").unwrap();

        let new = ext_id(scheme::USERNAME, "jdoe", 1).with_email("new@example.com");
        notes.upsert(vec![new.clone()]).unwrap();
        let outcome = notes.commit(committer(), "update email").unwrap();

        let CommitOutcome::Committed { removed, added, .. } = outcome else {
            panic!("expected a commit");
        };
        assert_eq!(removed, vec![old]);
        assert_eq!(added, vec![new.clone()]);
        assert_eq!(notes.get(new.key()).unwrap(), Some(new));
    }

    #[test]
    fn upsert_preserves_unrecognized_note_content() {
        let mut notes = store();
        let jdoe = ext_id(scheme::USERNAME, "jdoe", 1);
        notes.insert(vec![jdoe.clone()]).unwrap();
        notes.commit(committer(), "create").unwrap();

        // Write an extra line into the stored note out of band.
        let factory = KeyFactory::new(false);
        let note_id = factory.note_id(jdoe.key());
        let loaded = notes.state.as_ref().unwrap();
        let blob_id = loaded.notes.get(&note_id).unwrap();
        let mut raw = notes.repo.read_blob(&blob_id).unwrap();
        raw.extend_from_slice(b"\ttokenHint = opaque\n");
        let new_blob = notes.repo.write_blob(&raw).unwrap();
        notes.state.as_mut().unwrap().notes.set(note_id, new_blob);

        notes
            .upsert(vec![jdoe.clone().with_email("j@example.com")])
            .unwrap();
        notes.commit(committer(), "update").unwrap();

        let blob_id = notes.state.as_ref().unwrap().notes.get(&note_id).unwrap();
        let raw = notes.repo.read_blob(&blob_id).unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.contains("tokenHint = opaque"));
        assert!(text.contains("email = j@example.com"));
    }

    #[test]
    fn delete_requires_full_record_match() {
        let mut notes = store();
        let stored = ext_id(scheme::USERNAME, "jdoe", 1).with_email("j@example.com");
        notes.insert(vec![stored.clone()]).unwrap();
        notes.commit(committer(), "create").unwrap();

        // Same key, different content.
        notes
            .delete(vec![ext_id(scheme::USERNAME, "jdoe", 1)])
            .unwrap();
        assert!(matches!(
            notes.commit(committer(), "delete"),
            Err(NotesError::InvariantViolation(_))
        ));

        notes.load().unwrap();
        notes.delete(vec![stored.clone()]).unwrap();
        let outcome = notes.commit(committer(), "delete").unwrap();
        let CommitOutcome::Committed { removed, .. } = outcome else {
            panic!("expected a commit");
        };
        assert_eq!(removed, vec![stored.clone()]);
        assert_eq!(notes.get(stored.key()).unwrap(), None);
    }

    #[test]
    fn delete_keys_checks_owning_account() {
        let mut notes = store();
        notes.insert(vec![ext_id(scheme::USERNAME, "jdoe", 1)]).unwrap();
        notes.commit(committer(), "create").unwrap();

        notes
            .delete_keys(AccountId::new(2), vec![key(scheme::USERNAME, "jdoe")])
            .unwrap();
        assert!(matches!(
            notes.commit(committer(), "delete"),
            Err(NotesError::InvariantViolation(_))
        ));

        notes.load().unwrap();
        notes
            .delete_keys(AccountId::new(1), vec![key(scheme::USERNAME, "jdoe")])
            .unwrap();
        notes.commit(committer(), "delete").unwrap();
        assert!(notes.all().unwrap().is_empty());
    }

    #[test]
    fn deleting_a_missing_key_is_a_no_op() {
        let mut notes = store();
        notes
            .delete_by_keys(vec![key(scheme::USERNAME, "ghost")])
            .unwrap();
        let outcome = notes.commit(committer(), "delete").unwrap();
        assert!(matches!(outcome, CommitOutcome::NoChanges { .. }));
    }

    #[test]
    fn replace_is_delete_then_add() {
        let mut notes = store();
        let old = ext_id(scheme::USERNAME, "jdoe", 1).with_email("old@example.com");
        notes.insert(vec![old.clone()]).unwrap();
        notes.commit(committer(), "create").unwrap();

        // Deleting and re-adding the same key in one replace is legal and
        // yields the new content.
        let new = ext_id(scheme::USERNAME, "jdoe", 1).with_email("new@example.com");
        notes
            .replace(
                AccountId::new(1),
                vec![old.key().clone()],
                vec![new.clone()],
            )
            .unwrap();
        let outcome = notes.commit(committer(), "replace").unwrap();
        let CommitOutcome::Committed { removed, added, .. } = outcome else {
            panic!("expected a commit");
        };
        assert_eq!(removed, vec![old]);
        assert_eq!(added, vec![new.clone()]);
        assert_eq!(notes.get(new.key()).unwrap(), Some(new));
    }

    #[test]
    fn replace_by_keys_is_not_account_scoped() {
        let mut notes = store();
        let old = ext_id(scheme::USERNAME, "jdoe", 1);
        notes.insert(vec![old.clone()]).unwrap();
        notes.commit(committer(), "create").unwrap();

        // Reassigning the key to another account is allowed here, unlike
        // in the account-scoped replace.
        let new = ext_id(scheme::USERNAME, "jdoe", 2);
        notes
            .replace_by_keys(vec![old.key().clone()], vec![new.clone()])
            .unwrap();
        let outcome = notes.commit(committer(), "move").unwrap();
        let CommitOutcome::Committed { removed, .. } = outcome else {
            panic!("expected a commit");
        };
        assert_eq!(removed, vec![old]);
        assert_eq!(notes.get(new.key()).unwrap(), Some(new));
    }

    #[test]
    fn replace_rejects_foreign_accounts_and_existing_keys() {
        let mut notes = store();
        notes.insert(vec![ext_id(scheme::USERNAME, "taken", 2)]).unwrap();
        notes.commit(committer(), "create").unwrap();

        // Added record owned by a different account.
        assert!(matches!(
            notes.replace(
                AccountId::new(1),
                vec![],
                vec![ext_id(scheme::USERNAME, "jdoe", 2)]
            ),
            Err(NotesError::InvariantViolation(_))
        ));

        // Net-new key that already exists and is not deleted in this call.
        assert!(matches!(
            notes.replace(
                AccountId::new(2),
                vec![],
                vec![ext_id(scheme::USERNAME, "taken", 2)]
            ),
            Err(NotesError::DuplicateKey(_))
        ));
    }

    #[test]
    fn commit_without_effect_reports_no_changes() {
        let mut notes = store();
        let outcome = notes.commit(committer(), "empty").unwrap();
        assert!(matches!(outcome, CommitOutcome::NoChanges { rev } if rev.is_zero()));

        let jdoe = ext_id(scheme::USERNAME, "jdoe", 1);
        notes.insert(vec![jdoe.clone()]).unwrap();
        notes.commit(committer(), "create").unwrap();

        // Upserting identical content produces an identical tree.
        notes.upsert(vec![jdoe]).unwrap();
        let outcome = notes.commit(committer(), "noop").unwrap();
        assert!(matches!(outcome, CommitOutcome::NoChanges { .. }));
    }

    #[test]
    fn losing_writer_gets_a_lock_failure() {
        let repo = NotesRepo::in_memory();
        let mut first = ExternalIdNotes::new(repo.clone(), KeyFactory::new(false));
        first.load().unwrap();
        let mut second = ExternalIdNotes::new(repo, KeyFactory::new(false));
        second.load().unwrap();

        first.insert(vec![ext_id(scheme::USERNAME, "a", 1)]).unwrap();
        first.commit(committer(), "first").unwrap();

        second.insert(vec![ext_id(scheme::USERNAME, "b", 2)]).unwrap();
        let err = second.commit(committer(), "second").unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, NotesError::Repo(RepoError::LockFailure { .. })));
    }

    #[test]
    fn commit_message_carries_sorted_footers() {
        let mut notes = store();
        notes
            .insert(vec![
                ext_id(scheme::USERNAME, "b", 20).with_email("b@example.com"),
                ext_id(scheme::USERNAME, "a", 10).with_email("a@example.com"),
            ])
            .unwrap();
        let outcome = notes.commit(committer(), "Create accounts").unwrap();
        let CommitOutcome::Committed { new_rev, .. } = outcome else {
            panic!("expected a commit");
        };

        let message = notes.repo.read_commit(&new_rev).unwrap().message;
        assert_eq!(
            message,
            "Create accounts\n\
             \n\
             Account: 10\n\
             Account: 20\n\
             Email: a@example.com\n\
             Email: b@example.com"
        );
    }

    #[test]
    fn read_only_store_rejects_staging() {
        let mut notes = store();
        notes.set_read_only();
        assert!(matches!(
            notes.insert(vec![ext_id(scheme::USERNAME, "jdoe", 1)]),
            Err(NotesError::UpdatesDisabled)
        ));
        assert!(matches!(
            notes.delete_by_keys(vec![key(scheme::USERNAME, "jdoe")]),
            Err(NotesError::UpdatesDisabled)
        ));
    }

    #[test]
    fn case_migration_lookup_probes_both_hashes() {
        // Written under the case-sensitive policy...
        let repo = NotesRepo::in_memory();
        let mut writer = ExternalIdNotes::new(repo.clone(), KeyFactory::new(false));
        writer.load().unwrap();
        let jdoe = ext_id(scheme::USERNAME, "JDoe", 1);
        writer.insert(vec![jdoe.clone()]).unwrap();
        writer.commit(committer(), "create").unwrap();

        // ...still found after flipping to case-insensitive note IDs.
        let mut reader = ExternalIdNotes::new(repo, KeyFactory::new(true));
        reader.load().unwrap();
        assert_eq!(reader.get(jdoe.key()).unwrap(), Some(jdoe));
    }

    struct RecordingSink {
        evicted: Mutex<Vec<AccountId>>,
        indexed: Mutex<Vec<AccountId>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                evicted: Mutex::new(Vec::new()),
                indexed: Mutex::new(Vec::new()),
            }
        }
    }

    impl AccountIndexSink for RecordingSink {
        fn evict(&self, account: AccountId) {
            self.evicted.lock().expect("lock poisoned").push(account);
        }

        fn index(&self, account: AccountId) {
            self.indexed.lock().expect("lock poisoned").push(account);
        }
    }

    #[test]
    fn update_caches_evicts_affected_accounts_minus_skip_list() {
        let mut notes = store();
        notes
            .insert(vec![
                ext_id(scheme::USERNAME, "a", 1),
                ext_id(scheme::USERNAME, "b", 2),
            ])
            .unwrap();
        let outcome = notes.commit(committer(), "create").unwrap();

        let sink = RecordingSink::new();
        let cache = extid_cache::DisabledExternalIdCache;
        update_caches(&cache, &sink, &outcome, &[AccountId::new(2)]).unwrap();

        assert_eq!(*sink.evicted.lock().unwrap(), vec![AccountId::new(1)]);
        assert_eq!(*sink.indexed.lock().unwrap(), vec![AccountId::new(1)]);
    }

    #[test]
    fn update_caches_ignores_no_change_outcomes() {
        let sink = RecordingSink::new();
        let cache = extid_cache::DisabledExternalIdCache;
        let outcome = CommitOutcome::NoChanges {
            rev: ObjectId::zero(),
        };
        update_caches(&cache, &sink, &outcome, &[]).unwrap();
        assert!(sink.evicted.lock().unwrap().is_empty());
    }
}
