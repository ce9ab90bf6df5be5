//! The immutable external-ID record.

use std::hash::{Hash, Hasher};

use extid_types::{AccountId, ObjectId};

use crate::key::ExternalIdKey;

/// One external identity and the account it belongs to.
///
/// `blob_id` is the content hash of the note blob this record was read from
/// (or written to). It is `None` only for records that have not been
/// persisted yet, and it is deliberately excluded from equality and
/// hashing: two records with identical key, account, email, and secret are
/// the same identity no matter which blob they came from.
#[derive(Clone, Debug)]
pub struct ExternalId {
    key: ExternalIdKey,
    account_id: AccountId,
    email: Option<String>,
    hashed_secret: Option<String>,
    blob_id: Option<ObjectId>,
}

impl ExternalId {
    /// Create a record with no email or secret.
    pub fn new(key: ExternalIdKey, account_id: AccountId) -> Self {
        Self {
            key,
            account_id,
            email: None,
            hashed_secret: None,
            blob_id: None,
        }
    }

    /// Attach an email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Attach a pre-hashed secret.
    pub fn with_secret(mut self, hashed_secret: impl Into<String>) -> Self {
        self.hashed_secret = Some(hashed_secret.into());
        self
    }

    /// Attach the blob this record is persisted under.
    pub fn with_blob_id(mut self, blob_id: ObjectId) -> Self {
        self.blob_id = Some(blob_id);
        self
    }

    pub fn key(&self) -> &ExternalIdKey {
        &self.key
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn hashed_secret(&self) -> Option<&str> {
        self.hashed_secret.as_deref()
    }

    /// The blob this record was read from; `None` when not yet persisted.
    pub fn blob_id(&self) -> Option<ObjectId> {
        self.blob_id
    }

    /// Returns `true` if this record's key uses the given scheme.
    pub fn is_scheme(&self, scheme: &str) -> bool {
        self.key.is_scheme(scheme)
    }
}

impl PartialEq for ExternalId {
    fn eq(&self, other: &Self) -> bool {
        // blob_id intentionally excluded.
        self.key == other.key
            && self.account_id == other.account_id
            && self.email == other.email
            && self.hashed_secret == other.hashed_secret
    }
}

impl Eq for ExternalId {}

impl Hash for ExternalId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.account_id.hash(state);
        self.email.hash(state);
        self.hashed_secret.hash(state);
    }
}

impl std::fmt::Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> account {}", self.key, self.account_id)?;
        if let Some(email) = &self.email {
            write!(f, " ({email})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::scheme;

    fn key(s: &str) -> ExternalIdKey {
        ExternalIdKey::create(Some(scheme::USERNAME), s).unwrap()
    }

    #[test]
    fn equality_excludes_blob_id() {
        let a = ExternalId::new(key("alice"), AccountId::new(7)).with_email("a@example.com");
        let b = a.clone().with_blob_id(ObjectId::from_hash([1; 32]));
        let c = a.clone().with_blob_id(ObjectId::from_hash([2; 32]));
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn equality_covers_business_fields() {
        let base = ExternalId::new(key("alice"), AccountId::new(7));
        assert_ne!(base, ExternalId::new(key("bob"), AccountId::new(7)));
        assert_ne!(base, ExternalId::new(key("alice"), AccountId::new(8)));
        assert_ne!(base, base.clone().with_email("a@example.com"));
        assert_ne!(base, base.clone().with_secret("bcrypt:4:aaaa:bbbb"));
    }

    #[test]
    fn hash_consistent_with_eq() {
        use std::collections::HashSet;
        let a = ExternalId::new(key("alice"), AccountId::new(7));
        let b = a.clone().with_blob_id(ObjectId::from_hash([9; 32]));
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }
}
