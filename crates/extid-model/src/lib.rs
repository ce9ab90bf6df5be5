//! External-ID value types.
//!
//! An external ID links one external credential (username, email address,
//! OAuth subject, GPG key fingerprint) to exactly one account. This crate
//! holds the immutable value types and the persisted wire format:
//! - [`ExternalIdKey`] and the closed [`scheme`] set
//! - [`KeyFactory`], which turns keys into note IDs under the configured
//!   case-sensitivity policy
//! - [`ExternalId`], the identity record (equality excludes the
//!   storage-only blob ID)
//! - the note text format ([`render_note`] / [`parse_note`])
//! - grammar helpers for usernames, emails, and hashed secrets

pub mod error;
pub mod format;
pub mod key;
pub mod record;
pub mod validation;

pub use error::{ModelError, ModelResult};
pub use format::{parse_note, render_note};
pub use key::{scheme, ExternalIdKey, KeyFactory};
pub use record::ExternalId;
pub use validation::{check_hashed_secret, is_valid_email, is_valid_username};
