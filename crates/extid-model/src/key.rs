//! Identity keys and the note-ID factory.

use std::fmt;

use extid_types::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// The closed set of identity schemes.
pub mod scheme {
    /// Internal UUID-based identity assigned at account creation.
    pub const UUID: &str = "uuid";
    /// Email-address identity.
    pub const MAILTO: &str = "mailto";
    /// Login username identity, may carry a hashed secret.
    pub const USERNAME: &str = "username";
    /// GPG key fingerprint identity.
    pub const GPGKEY: &str = "gpgkey";
    /// Legacy site-local identity.
    pub const GERRIT: &str = "gerrit";
    /// OAuth/LDAP identity from an external realm.
    pub const EXTERNAL: &str = "external";
}

/// Domain tag for note-ID hashing.
const NOTE_ID_DOMAIN: &str = "extid-key-v1";

/// The key of an external ID: an optional scheme plus a local ID.
///
/// Serializes to `"scheme:localId"`, or just `"localId"` when the scheme is
/// absent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalIdKey {
    scheme: Option<String>,
    local_id: String,
}

impl ExternalIdKey {
    /// Create a key. An empty scheme is normalized to absent.
    ///
    /// Fails if the scheme contains the reserved `:` separator.
    pub fn create(scheme: Option<&str>, local_id: impl Into<String>) -> ModelResult<Self> {
        let scheme = match scheme {
            None | Some("") => None,
            Some(s) if s.contains(':') => {
                return Err(ModelError::InvalidScheme(s.to_string()));
            }
            Some(s) => Some(s.to_string()),
        };
        Ok(Self {
            scheme,
            local_id: local_id.into(),
        })
    }

    /// Parse a key from its serialized form.
    ///
    /// Splits on the first `:`. A colon at position 0 or at the very end is
    /// not treated as a separator; the whole input becomes the local ID.
    pub fn parse(s: &str) -> Self {
        match s.find(':') {
            Some(c) if c >= 1 && c != s.len() - 1 => Self {
                scheme: Some(s[..c].to_string()),
                local_id: s[c + 1..].to_string(),
            },
            _ => Self {
                scheme: None,
                local_id: s.to_string(),
            },
        }
    }

    /// The serialized `"scheme:localId"` form.
    pub fn serialize(&self) -> String {
        match &self.scheme {
            Some(scheme) => format!("{scheme}:{}", self.local_id),
            None => self.local_id.clone(),
        }
    }

    /// The scheme, if any.
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// The local part of the key.
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Returns `true` if this key uses the given scheme.
    pub fn is_scheme(&self, scheme: &str) -> bool {
        self.scheme.as_deref() == Some(scheme)
    }

    /// Keys in the `username` and `gerrit` schemes are subject to the
    /// case-sensitivity policy; all other schemes always hash as-is.
    pub fn is_case_managed(&self) -> bool {
        self.is_scheme(scheme::USERNAME) || self.is_scheme(scheme::GERRIT)
    }
}

impl fmt::Display for ExternalIdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

/// Computes note IDs from keys under a fixed case-sensitivity policy.
///
/// The policy is captured at construction time and threaded explicitly; no
/// hidden global state. With `case_insensitive` set, keys in the case
/// managed schemes hash their lowercased serialization, which yields a
/// different note ID than the case-preserving hash of the same logical key.
/// During a policy migration both variants must be probed, which is what
/// [`KeyFactory::candidate_note_ids`] is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyFactory {
    case_insensitive: bool,
}

impl KeyFactory {
    /// Create a factory with the given server-wide policy.
    pub fn new(case_insensitive: bool) -> Self {
        Self { case_insensitive }
    }

    /// Whether this factory hashes case-managed schemes case-insensitively.
    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// The note ID of a key under the configured policy.
    pub fn note_id(&self, key: &ExternalIdKey) -> ObjectId {
        if self.case_insensitive && key.is_case_managed() {
            ObjectId::hash(NOTE_ID_DOMAIN, key.serialize().to_lowercase().as_bytes())
        } else {
            self.case_sensitive_note_id(key)
        }
    }

    /// The case-preserving note ID, regardless of policy.
    pub fn case_sensitive_note_id(&self, key: &ExternalIdKey) -> ObjectId {
        ObjectId::hash(NOTE_ID_DOMAIN, key.serialize().as_bytes())
    }

    /// All note IDs a lookup must probe to tolerate a policy migration:
    /// the policy hash first, then the case-preserving hash if it differs.
    pub fn candidate_note_ids(&self, key: &ExternalIdKey) -> Vec<ObjectId> {
        let primary = self.note_id(key);
        let sensitive = self.case_sensitive_note_id(key);
        if sensitive != primary {
            vec![primary, sensitive]
        } else {
            vec![primary]
        }
    }
}
