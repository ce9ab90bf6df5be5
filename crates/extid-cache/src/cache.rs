//! The read-through cache surface.

use std::collections::HashMap;
use std::sync::Arc;

use extid_model::ExternalId;
use extid_repo::{NotesRepo, REFS_EXTERNAL_IDS};
use extid_types::{AccountId, ObjectId};
use quick_cache::sync::Cache;
use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::loader::ExternalIdCacheLoader;
use crate::snapshot::AllExternalIds;

/// Revision-keyed store of materialized snapshots.
///
/// Readers only probe and insert; eviction is capacity-driven. Probing a
/// revision that was never populated simply misses.
pub struct SnapshotCache {
    inner: Cache<ObjectId, Arc<AllExternalIds>>,
}

impl SnapshotCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Cache::new(capacity),
        }
    }

    pub fn get(&self, rev: &ObjectId) -> Option<Arc<AllExternalIds>> {
        self.inner.get(rev)
    }

    pub fn insert(&self, rev: ObjectId, snapshot: Arc<AllExternalIds>) {
        self.inner.insert(rev, snapshot);
    }

    pub fn remove(&self, rev: &ObjectId) -> Option<Arc<AllExternalIds>> {
        self.inner.remove(rev).map(|(_, v)| v)
    }
}

/// Identity lookups served from per-revision snapshots.
///
/// The "current" read path resolves the live branch revision first, then
/// loads that revision's snapshot; there is no notion of a mutable current
/// state outside the branch ref.
pub trait ExternalIdCache: Send + Sync {
    /// All external IDs of one account at the live revision.
    fn by_account(&self, account: AccountId) -> CacheResult<Vec<ExternalId>>;

    /// All external IDs of one account at a specific revision.
    fn by_account_at(&self, account: AccountId, rev: ObjectId) -> CacheResult<Vec<ExternalId>>;

    /// All external IDs grouped by account at the live revision.
    fn all_by_account(&self) -> CacheResult<HashMap<AccountId, Vec<ExternalId>>>;

    /// All external IDs carrying the given email at the live revision.
    fn by_email(&self, email: &str) -> CacheResult<Vec<ExternalId>>;

    /// Batch email lookup against a single resolution of the live
    /// revision. Every requested email is present in the result, with an
    /// empty list when nothing carries it.
    fn by_emails(&self, emails: &[&str]) -> CacheResult<HashMap<String, Vec<ExternalId>>>;

    /// All external IDs grouped by email at the live revision.
    fn all_by_email(&self) -> CacheResult<HashMap<String, Vec<ExternalId>>>;

    /// Called exactly once after each successful commit, with the records
    /// the commit removed and added.
    fn on_replace(
        &self,
        old_rev: ObjectId,
        new_rev: ObjectId,
        removed: &[ExternalId],
        added: &[ExternalId],
    ) -> CacheResult<()>;

    /// Called after a history rewrite that preserved content: the snapshot
    /// cached under `old_rev`, if any, is also valid for `new_rev`.
    fn on_rekey(&self, old_rev: ObjectId, new_rev: ObjectId) -> CacheResult<()>;
}

/// The production cache: a loader plus the repository whose branch ref
/// defines "current".
pub struct ExternalIdCacheImpl {
    repo: NotesRepo,
    loader: ExternalIdCacheLoader,
}

impl ExternalIdCacheImpl {
    pub fn new(repo: NotesRepo, loader: ExternalIdCacheLoader) -> Self {
        Self { repo, loader }
    }

    pub fn snapshot_at(&self, rev: ObjectId) -> CacheResult<Arc<AllExternalIds>> {
        self.loader.load(&self.repo, rev)
    }

    fn current(&self) -> CacheResult<Arc<AllExternalIds>> {
        let rev = self.repo.resolve(REFS_EXTERNAL_IDS)?;
        self.snapshot_at(rev)
    }
}

impl ExternalIdCache for ExternalIdCacheImpl {
    fn by_account(&self, account: AccountId) -> CacheResult<Vec<ExternalId>> {
        Ok(self.current()?.by_account(account))
    }

    fn by_account_at(&self, account: AccountId, rev: ObjectId) -> CacheResult<Vec<ExternalId>> {
        Ok(self.snapshot_at(rev)?.by_account(account))
    }

    fn all_by_account(&self) -> CacheResult<HashMap<AccountId, Vec<ExternalId>>> {
        let snapshot = self.current()?;
        Ok(snapshot
            .accounts()
            .map(|a| (a, snapshot.by_account(a)))
            .collect())
    }

    fn by_email(&self, email: &str) -> CacheResult<Vec<ExternalId>> {
        Ok(self.current()?.by_email(email))
    }

    fn by_emails(&self, emails: &[&str]) -> CacheResult<HashMap<String, Vec<ExternalId>>> {
        let snapshot = self.current()?;
        Ok(emails
            .iter()
            .map(|e| (e.to_string(), snapshot.by_email(e)))
            .collect())
    }

    fn all_by_email(&self) -> CacheResult<HashMap<String, Vec<ExternalId>>> {
        let snapshot = self.current()?;
        Ok(snapshot
            .emails()
            .map(|e| (e.to_string(), snapshot.by_email(e)))
            .collect())
    }

    fn on_replace(
        &self,
        old_rev: ObjectId,
        new_rev: ObjectId,
        removed: &[ExternalId],
        added: &[ExternalId],
    ) -> CacheResult<()> {
        if new_rev.is_zero() {
            return Ok(());
        }
        match self.loader.snapshots().get(&old_rev) {
            Some(old) => {
                let next = Arc::new(old.replaced(removed, added));
                self.loader.snapshots().insert(new_rev, next);
                Ok(())
            }
            // Old state not cached: materialize the new revision outright.
            None => self.snapshot_at(new_rev).map(|_| ()),
        }
    }

    fn on_rekey(&self, old_rev: ObjectId, new_rev: ObjectId) -> CacheResult<()> {
        if let Some(snapshot) = self.loader.snapshots().get(&old_rev) {
            debug!(old = %old_rev, new = %new_rev, "re-keying external ID snapshot");
            self.loader.snapshots().insert(new_rev, snapshot);
        }
        Ok(())
    }
}

/// For contexts that must not read identities through a cache, such as
/// offline migrations. Reads fail loudly; write-path hooks are accepted
/// and dropped.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledExternalIdCache;

impl ExternalIdCache for DisabledExternalIdCache {
    fn by_account(&self, _account: AccountId) -> CacheResult<Vec<ExternalId>> {
        Err(CacheError::ReadsDisabled)
    }

    fn by_account_at(&self, _account: AccountId, _rev: ObjectId) -> CacheResult<Vec<ExternalId>> {
        Err(CacheError::ReadsDisabled)
    }

    fn all_by_account(&self) -> CacheResult<HashMap<AccountId, Vec<ExternalId>>> {
        Err(CacheError::ReadsDisabled)
    }

    fn by_email(&self, _email: &str) -> CacheResult<Vec<ExternalId>> {
        Err(CacheError::ReadsDisabled)
    }

    fn by_emails(&self, _emails: &[&str]) -> CacheResult<HashMap<String, Vec<ExternalId>>> {
        Err(CacheError::ReadsDisabled)
    }

    fn all_by_email(&self) -> CacheResult<HashMap<String, Vec<ExternalId>>> {
        Err(CacheError::ReadsDisabled)
    }

    fn on_replace(
        &self,
        _old_rev: ObjectId,
        _new_rev: ObjectId,
        _removed: &[ExternalId],
        _added: &[ExternalId],
    ) -> CacheResult<()> {
        Ok(())
    }

    fn on_rekey(&self, _old_rev: ObjectId, _new_rev: ObjectId) -> CacheResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use extid_model::{render_note, scheme, ExternalIdKey, KeyFactory};
    use extid_repo::{Commit, Ident, NoteMap};

    fn ext_id(id: &str, account: u32) -> ExternalId {
        let key = ExternalIdKey::create(Some(scheme::USERNAME), id).unwrap();
        ExternalId::new(key, AccountId::new(account))
    }

    fn commit_ids(repo: &NotesRepo, parent: ObjectId, ids: &[ExternalId]) -> ObjectId {
        let factory = KeyFactory::new(false);
        let mut notes = NoteMap::empty();
        for ext_id in ids {
            let note_id = factory.note_id(ext_id.key());
            let raw = render_note(&note_id.to_hex(), ext_id, None).unwrap();
            let blob_id = repo.write_blob(&raw).unwrap();
            notes.set(note_id, blob_id);
        }
        let when = Utc::now();
        let ident = Ident::new("Identity Service", "identities@service.example", when);
        let tree = notes.write_tree(repo).unwrap();
        let rev = repo
            .write_commit(&Commit {
                tree,
                parents: if parent.is_zero() { vec![] } else { vec![parent] },
                author: ident.clone(),
                committer: ident,
                message: "Update external IDs".to_string(),
            })
            .unwrap();
        repo.update_ref(REFS_EXTERNAL_IDS, parent, rev).unwrap();
        rev
    }

    fn cache_for(repo: &NotesRepo) -> ExternalIdCacheImpl {
        ExternalIdCacheImpl::new(repo.clone(), ExternalIdCacheLoader::new(16))
    }

    #[test]
    fn reads_track_the_live_revision() {
        let repo = NotesRepo::in_memory();
        let cache = cache_for(&repo);
        assert!(cache.by_account(AccountId::new(1)).unwrap().is_empty());

        let a = ext_id("a", 1).with_email("a@example.com");
        let rev = commit_ids(&repo, ObjectId::zero(), &[a.clone()]);

        assert_eq!(cache.by_account(AccountId::new(1)).unwrap(), vec![a.clone()]);
        assert_eq!(cache.by_email("a@example.com").unwrap(), vec![a.clone()]);

        let b = ext_id("b", 2);
        commit_ids(&repo, rev, &[a.clone(), b.clone()]);
        assert_eq!(cache.by_account(AccountId::new(2)).unwrap(), vec![b]);
        // Point-in-time read against the superseded revision still works.
        assert!(cache
            .by_account_at(AccountId::new(2), rev)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn by_emails_includes_misses() {
        let repo = NotesRepo::in_memory();
        let cache = cache_for(&repo);
        commit_ids(
            &repo,
            ObjectId::zero(),
            &[ext_id("a", 1).with_email("a@example.com")],
        );

        let found = cache.by_emails(&["a@example.com", "nobody@example.com"]).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["a@example.com"].len(), 1);
        assert!(found["nobody@example.com"].is_empty());
    }

    #[test]
    fn on_replace_updates_cached_state_without_reload() {
        let repo = NotesRepo::in_memory();
        let cache = cache_for(&repo);

        let old = ext_id("a", 1);
        let old_rev = commit_ids(&repo, ObjectId::zero(), &[old.clone()]);
        cache.by_account(AccountId::new(1)).unwrap();

        let new = ext_id("a", 1).with_email("a@example.com");
        let new_rev = commit_ids(&repo, old_rev, &[new.clone()]);
        cache
            .on_replace(old_rev, new_rev, &[old], &[new.clone()])
            .unwrap();

        let snapshot = cache.snapshot_at(new_rev).unwrap();
        assert_eq!(snapshot.get(new.key()), Some(&new));
    }

    #[test]
    fn on_rekey_carries_the_snapshot_over() {
        let repo = NotesRepo::in_memory();
        let cache = cache_for(&repo);
        let rev = commit_ids(&repo, ObjectId::zero(), &[ext_id("a", 1)]);
        let snapshot = cache.snapshot_at(rev).unwrap();

        let new_tip = ObjectId::from_hash([7; 32]);
        cache.on_rekey(rev, new_tip).unwrap();
        let moved = cache.snapshot_at(new_tip).unwrap();
        assert!(Arc::ptr_eq(&snapshot, &moved));
    }

    #[test]
    fn disabled_cache_fails_reads_and_accepts_hooks() {
        let cache = DisabledExternalIdCache;
        assert!(matches!(
            cache.by_account(AccountId::new(1)),
            Err(CacheError::ReadsDisabled)
        ));
        assert!(matches!(cache.all_by_email(), Err(CacheError::ReadsDisabled)));
        cache
            .on_replace(ObjectId::zero(), ObjectId::from_hash([1; 32]), &[], &[])
            .unwrap();
        cache
            .on_rekey(ObjectId::zero(), ObjectId::zero())
            .unwrap();
    }
}
