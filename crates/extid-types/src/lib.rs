//! Core identifiers for the external-ID storage engine.
//!
//! This crate holds the two primitive identifier types everything else is
//! built on: [`ObjectId`], a 32-byte content hash naming blobs, trees,
//! commits and branch revisions, and [`AccountId`], the numeric account an
//! external identity is linked to.

pub mod account;
pub mod error;
pub mod object;

pub use account::AccountId;
pub use error::TypeError;
pub use object::ObjectId;
