//! The immutable per-revision aggregate of every external ID.

use std::collections::{HashMap, HashSet};

use extid_model::{ExternalId, ExternalIdKey};
use extid_types::{AccountId, ObjectId};

/// Every external ID on the branch at one revision, indexed three ways.
///
/// Snapshots are immutable once built; updates produce a new snapshot via
/// [`AllExternalIds::apply`] or [`AllExternalIds::replaced`]. The secondary
/// indexes hold keys sorted, so equal contents compare equal regardless of
/// construction order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllExternalIds {
    by_key: HashMap<ExternalIdKey, ExternalId>,
    by_account: HashMap<AccountId, Vec<ExternalIdKey>>,
    by_email: HashMap<String, Vec<ExternalIdKey>>,
}

impl AllExternalIds {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index a set of records. Later records win on key collisions, which
    /// cannot happen for records read from one note tree.
    pub fn build(ids: impl IntoIterator<Item = ExternalId>) -> Self {
        let mut by_key = HashMap::new();
        for ext_id in ids {
            by_key.insert(ext_id.key().clone(), ext_id);
        }

        let mut by_account: HashMap<AccountId, Vec<ExternalIdKey>> = HashMap::new();
        let mut by_email: HashMap<String, Vec<ExternalIdKey>> = HashMap::new();
        for ext_id in by_key.values() {
            by_account
                .entry(ext_id.account_id())
                .or_default()
                .push(ext_id.key().clone());
            if let Some(email) = ext_id.email() {
                by_email
                    .entry(email.to_string())
                    .or_default()
                    .push(ext_id.key().clone());
            }
        }
        for keys in by_account.values_mut() {
            keys.sort();
        }
        for keys in by_email.values_mut() {
            keys.sort();
        }

        Self {
            by_key,
            by_account,
            by_email,
        }
    }

    /// Differential step: drop every record whose blob is in the removal
    /// set, then add the freshly parsed records.
    pub fn apply(
        &self,
        removed_blobs: &HashSet<ObjectId>,
        added: impl IntoIterator<Item = ExternalId>,
    ) -> Self {
        let survivors = self
            .by_key
            .values()
            .filter(|e| !e.blob_id().is_some_and(|b| removed_blobs.contains(&b)))
            .cloned();
        Self::build(survivors.chain(added))
    }

    /// Commit step: drop the removed records by key, then add the new ones.
    pub fn replaced(&self, removed: &[ExternalId], added: &[ExternalId]) -> Self {
        let gone: HashSet<&ExternalIdKey> = removed.iter().map(|e| e.key()).collect();
        let survivors = self
            .by_key
            .values()
            .filter(|e| !gone.contains(e.key()))
            .cloned();
        Self::build(survivors.chain(added.iter().cloned()))
    }

    pub fn get(&self, key: &ExternalIdKey) -> Option<&ExternalId> {
        self.by_key.get(key)
    }

    pub fn by_account(&self, account: AccountId) -> Vec<ExternalId> {
        self.collect(self.by_account.get(&account))
    }

    pub fn by_email(&self, email: &str) -> Vec<ExternalId> {
        self.collect(self.by_email.get(email))
    }

    pub fn accounts(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.by_account.keys().copied()
    }

    pub fn emails(&self) -> impl Iterator<Item = &str> {
        self.by_email.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExternalId> {
        self.by_key.values()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    fn collect(&self, keys: Option<&Vec<ExternalIdKey>>) -> Vec<ExternalId> {
        keys.into_iter()
            .flatten()
            .filter_map(|k| self.by_key.get(k))
            .cloned()
            .collect()
    }
}
