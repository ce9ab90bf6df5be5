//! In-memory backends for tests and embedding.
//!
//! [`InMemoryObjectStore`] keeps objects in a `HashMap` behind a `RwLock`;
//! [`InMemoryRefDatabase`] keeps refs in a `HashMap` behind a `Mutex` and
//! implements true compare-and-swap semantics, including the distinct lock
//! failure on a lost race.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use extid_types::ObjectId;

use crate::error::{RepoError, RepoResult};
use crate::refs::RefDatabase;
use crate::store::{ObjectStore, StoredObject};

/// In-memory, HashMap-based object store.
///
/// All objects are held in memory behind a `RwLock` for safe concurrent
/// access. Objects are cloned on read/write.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn read(&self, id: &ObjectId) -> RepoResult<Option<StoredObject>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(id).cloned())
    }

    fn write(&self, object: &StoredObject) -> RepoResult<ObjectId> {
        let id = object.compute_id();
        let mut map = self.objects.write().expect("lock poisoned");
        // Idempotent: content-addressing guarantees the same ID always maps
        // to the same content.
        map.entry(id).or_insert_with(|| object.clone());
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> RepoResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}

/// In-memory ref database with compare-and-swap updates.
#[derive(Debug, Default)]
pub struct InMemoryRefDatabase {
    refs: Mutex<HashMap<String, ObjectId>>,
}

impl InMemoryRefDatabase {
    /// Create a new empty ref database.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefDatabase for InMemoryRefDatabase {
    fn resolve(&self, name: &str) -> RepoResult<ObjectId> {
        let refs = self.refs.lock().expect("lock poisoned");
        Ok(refs.get(name).copied().unwrap_or_else(ObjectId::zero))
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected: ObjectId,
        new: ObjectId,
    ) -> RepoResult<()> {
        if new.is_zero() {
            return Err(RepoError::RefUpdateRejected {
                name: name.to_string(),
                reason: "cannot point a ref at the zero object ID".to_string(),
            });
        }
        let mut refs = self.refs.lock().expect("lock poisoned");
        let actual = refs.get(name).copied().unwrap_or_else(ObjectId::zero);
        if actual != expected {
            return Err(RepoError::LockFailure {
                name: name.to_string(),
                expected,
                actual,
            });
        }
        refs.insert(name.to_string(), new);
        Ok(())
    }
}
