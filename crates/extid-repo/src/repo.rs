//! The [`NotesRepo`] facade and open-by-name [`RepoManager`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use extid_types::ObjectId;

use crate::commit::Commit;
use crate::error::{RepoError, RepoResult};
use crate::memory::{InMemoryObjectStore, InMemoryRefDatabase};
use crate::refs::RefDatabase;
use crate::store::{Blob, NoteTree, ObjectStore, StoredObject};

/// One repository: a content-addressed object store plus its ref database.
///
/// Typed read/write helpers live here so the layers above never touch raw
/// [`StoredObject`]s.
#[derive(Clone)]
pub struct NotesRepo {
    objects: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefDatabase>,
}

impl NotesRepo {
    /// Create a repository over the given backends.
    pub fn new(objects: Arc<dyn ObjectStore>, refs: Arc<dyn RefDatabase>) -> Self {
        Self { objects, refs }
    }

    /// Create a repository backed entirely by memory.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryRefDatabase::new()),
        )
    }

    /// The underlying object store.
    pub fn objects(&self) -> &dyn ObjectStore {
        self.objects.as_ref()
    }

    /// Resolve a ref by name; zero if the ref does not exist.
    pub fn resolve(&self, name: &str) -> RepoResult<ObjectId> {
        self.refs.resolve(name)
    }

    /// Compare-and-swap a ref update. See [`RefDatabase::compare_and_swap`].
    pub fn update_ref(&self, name: &str, expected: ObjectId, new: ObjectId) -> RepoResult<()> {
        self.refs.compare_and_swap(name, expected, new)
    }

    fn read_required(&self, id: &ObjectId) -> RepoResult<StoredObject> {
        self.objects
            .read(id)?
            .ok_or(RepoError::ObjectNotFound(*id))
    }

    /// Read a blob's bytes.
    pub fn read_blob(&self, id: &ObjectId) -> RepoResult<Vec<u8>> {
        let obj = self.read_required(id)?;
        Ok(Blob::from_stored_object(&obj)?.data)
    }

    /// Write a blob; returns its content-addressed ID.
    pub fn write_blob(&self, data: &[u8]) -> RepoResult<ObjectId> {
        self.objects
            .write(&Blob::new(data.to_vec()).to_stored_object())
    }

    /// Read a note tree.
    pub fn read_tree(&self, id: &ObjectId) -> RepoResult<NoteTree> {
        let obj = self.read_required(id)?;
        NoteTree::from_stored_object(&obj)
    }

    /// Write a note tree; returns its content-addressed ID.
    pub fn write_tree(&self, tree: &NoteTree) -> RepoResult<ObjectId> {
        self.objects.write(&tree.to_stored_object()?)
    }

    /// Read a commit.
    pub fn read_commit(&self, id: &ObjectId) -> RepoResult<Commit> {
        let obj = self.read_required(id)?;
        Commit::from_stored_object(&obj)
    }

    /// Write a commit; returns its content-addressed ID.
    pub fn write_commit(&self, commit: &Commit) -> RepoResult<ObjectId> {
        self.objects.write(&commit.to_stored_object()?)
    }
}

impl std::fmt::Debug for NotesRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotesRepo").finish_non_exhaustive()
    }
}

/// Open repositories by name.
pub trait RepoManager: Send + Sync {
    /// Open an existing repository.
    fn open(&self, name: &str) -> RepoResult<NotesRepo>;
}

/// In-memory registry of repositories, for tests and embedding.
#[derive(Default)]
pub struct InMemoryRepoManager {
    repos: RwLock<HashMap<String, NotesRepo>>,
}

impl InMemoryRepoManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or return the existing) repository under `name`.
    pub fn create(&self, name: &str) -> NotesRepo {
        let mut repos = self.repos.write().expect("lock poisoned");
        repos
            .entry(name.to_string())
            .or_insert_with(NotesRepo::in_memory)
            .clone()
    }
}

impl RepoManager for InMemoryRepoManager {
    fn open(&self, name: &str) -> RepoResult<NotesRepo> {
        let repos = self.repos.read().expect("lock poisoned");
        repos
            .get(name)
            .cloned()
            .ok_or_else(|| RepoError::RepositoryNotFound(name.to_string()))
    }
}
