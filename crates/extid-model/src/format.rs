//! The persisted note format.
//!
//! Each note is a small config-text block with exactly one `externalId`
//! section whose subsection name is the serialized key:
//!
//! ```text
//! [externalId "username:jdoe"]
//! 	accountId = 1003407
//! 	email = jdoe@example.com
//! 	password = bcrypt:4:LCbmSBDivK/hhGVQMfkDpA==:XcWn0pKYSVU/UJgOvhidkEtmqCp6oKB7
//! ```
//!
//! `accountId` is decimal text; `email` and `password` are omitted when
//! absent. Lines a given release does not understand are preserved across
//! rewrites, so newer fields survive round-trips through older code.

use extid_types::{AccountId, ObjectId};

use crate::error::{ModelError, ModelResult};
use crate::key::ExternalIdKey;
use crate::record::ExternalId;

const SECTION: &str = "externalId";
const KEY_ACCOUNT_ID: &str = "accountId";
const KEY_EMAIL: &str = "email";
const KEY_PASSWORD: &str = "password";

/// One parsed note: the subsection key plus its entries in file order.
struct NoteConfig {
    key: String,
    entries: Vec<(String, String)>,
}

impl NoteConfig {
    fn new(key: String) -> Self {
        Self {
            key,
            entries: Vec::new(),
        }
    }

    fn parse(text: &str) -> Result<Self, String> {
        let mut config: Option<NoteConfig> = None;
        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') {
                if config.is_some() {
                    return Err(format!("unexpected extra section at line {}", lineno + 1));
                }
                let key = parse_section_header(line)
                    .ok_or_else(|| format!("malformed section header at line {}", lineno + 1))?;
                config = Some(NoteConfig::new(key));
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                return Err(format!("malformed entry at line {}", lineno + 1));
            };
            let Some(config) = config.as_mut() else {
                return Err(format!("entry before section header at line {}", lineno + 1));
            };
            config
                .entries
                .push((name.trim().to_string(), value.trim().to_string()));
        }
        config.ok_or_else(|| format!("missing [{SECTION}] section"))
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Replace an entry in place, preserving file order, or append it.
    fn set(&mut self, name: &str, value: String) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    fn unset(&mut self, name: &str) {
        self.entries.retain(|(n, _)| n != name);
    }

    fn to_text(&self) -> String {
        let mut out = format!("[{SECTION} \"{}\"]\n", self.key);
        for (name, value) in &self.entries {
            out.push('\t');
            out.push_str(name);
            out.push_str(" = ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

fn parse_section_header(line: &str) -> Option<String> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?;
    let rest = inner.strip_prefix(SECTION)?.trim_start();
    let key = rest.strip_prefix('"')?.strip_suffix('"')?;
    Some(key.to_string())
}

/// Parse a note blob into an external ID.
///
/// `note` is the hex note name, used only in error messages; `blob_id` is
/// attached to the returned record.
pub fn parse_note(note: &str, raw: &[u8], blob_id: ObjectId) -> ModelResult<ExternalId> {
    let invalid = |reason: String| ModelError::InvalidNote {
        note: note.to_string(),
        reason,
    };

    let text = std::str::from_utf8(raw).map_err(|e| invalid(format!("not UTF-8: {e}")))?;
    let config = NoteConfig::parse(text).map_err(invalid)?;

    let key = ExternalIdKey::parse(&config.key);
    let account_id: AccountId = config
        .get(KEY_ACCOUNT_ID)
        .ok_or_else(|| invalid(format!("missing {KEY_ACCOUNT_ID}")))?
        .parse()
        .map_err(|e| invalid(format!("bad {KEY_ACCOUNT_ID}: {e}")))?;

    let mut ext_id = ExternalId::new(key, account_id).with_blob_id(blob_id);
    if let Some(email) = config.get(KEY_EMAIL) {
        ext_id = ext_id.with_email(email);
    }
    if let Some(password) = config.get(KEY_PASSWORD) {
        ext_id = ext_id.with_secret(password);
    }
    Ok(ext_id)
}

/// Render a record as note text.
///
/// When `prior` holds the note's previous content, its section key and any
/// entries this code does not manage are preserved; only `accountId`,
/// `email`, and `password` are rewritten. `note` is the hex note name for
/// error messages.
pub fn render_note(
    note: &str,
    ext_id: &ExternalId,
    prior: Option<&[u8]>,
) -> ModelResult<Vec<u8>> {
    let mut config = match prior {
        Some(raw) => {
            let text = std::str::from_utf8(raw).map_err(|e| ModelError::InvalidNote {
                note: note.to_string(),
                reason: format!("not UTF-8: {e}"),
            })?;
            NoteConfig::parse(text).map_err(|reason| ModelError::InvalidNote {
                note: note.to_string(),
                reason,
            })?
        }
        None => NoteConfig::new(ext_id.key().serialize()),
    };

    config.set(KEY_ACCOUNT_ID, ext_id.account_id().to_string());
    match ext_id.email() {
        Some(email) => config.set(KEY_EMAIL, email.to_string()),
        None => config.unset(KEY_EMAIL),
    }
    match ext_id.hashed_secret() {
        Some(secret) => config.set(KEY_PASSWORD, secret.to_string()),
        None => config.unset(KEY_PASSWORD),
    }

    Ok(config.to_text().into_bytes())
}
