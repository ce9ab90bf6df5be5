//! Commit objects on the identities branch.

use chrono::{DateTime, Utc};
use extid_types::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};
use crate::store::{ObjectKind, StoredObject};

/// Author/committer identity stamped on a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    pub email: String,
    pub when: DateTime<Utc>,
}

impl Ident {
    /// Create a new identity.
    pub fn new(name: impl Into<String>, email: impl Into<String>, when: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            when,
        }
    }
}

/// A commit on the identities branch.
///
/// Commits on this branch form a strictly linear history: zero parents for
/// the root commit, exactly one otherwise. Merge commits are a modeling
/// violation and the history walkers reject them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Root note tree of this revision.
    pub tree: ObjectId,
    /// Parent commits (empty for the root).
    pub parents: Vec<ObjectId>,
    pub author: Ident,
    pub committer: Ident,
    pub message: String,
}

impl Commit {
    /// The first parent, if any. History walks on the identities branch
    /// follow first parents only.
    pub fn first_parent(&self) -> Option<ObjectId> {
        self.parents.first().copied()
    }

    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> RepoResult<StoredObject> {
        let data =
            serde_json::to_vec(self).map_err(|e| RepoError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Commit, data))
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> RepoResult<Self> {
        if obj.kind != ObjectKind::Commit {
            return Err(RepoError::CorruptObject {
                id: obj.compute_id(),
                reason: format!("expected commit, got {}", obj.kind),
            });
        }
        serde_json::from_slice(&obj.data).map_err(|e| RepoError::Serialization(e.to_string()))
    }
}
