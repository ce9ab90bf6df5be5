//! Read-only audit of every stored external ID.

use std::collections::BTreeMap;

use extid_model::{check_hashed_secret, is_valid_email, is_valid_username, parse_note, scheme};
use extid_repo::{NoteMap, NotesRepo, REFS_EXTERNAL_IDS};
use extid_types::AccountId;

use crate::error::MaintResult;

/// Existence checks against the system's account store.
pub trait AccountResolver: Send + Sync {
    fn exists(&self, account: AccountId) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProblemStatus {
    Error,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsistencyProblem {
    pub status: ProblemStatus,
    pub message: String,
}

impl ConsistencyProblem {
    fn error(message: String) -> Self {
        Self {
            status: ProblemStatus::Error,
            message,
        }
    }
}

/// Walks every note at the live revision and reports what is wrong with
/// it. Nothing is fixed and nothing is thrown for bad data; every finding
/// becomes a problem entry.
pub struct ConsistencyChecker {
    repo: NotesRepo,
    accounts: Box<dyn AccountResolver>,
}

impl ConsistencyChecker {
    pub fn new(repo: NotesRepo, accounts: Box<dyn AccountResolver>) -> Self {
        Self { repo, accounts }
    }

    pub fn check(&self) -> MaintResult<Vec<ConsistencyProblem>> {
        let rev = self.repo.resolve(REFS_EXTERNAL_IDS)?;
        let notes = NoteMap::read(&self.repo, rev)?;

        let mut problems = Vec::new();
        let mut keys_by_email: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (note_id, blob_id) in notes.iter() {
            let raw = self.repo.read_blob(blob_id)?;
            let ext_id = match parse_note(&note_id.to_hex(), &raw, *blob_id) {
                Ok(ext_id) => ext_id,
                Err(e) => {
                    problems.push(ConsistencyProblem::error(format!(
                        "Invalid external ID config for note '{}': {e}",
                        note_id.to_hex()
                    )));
                    continue;
                }
            };
            let key = ext_id.key().serialize();

            if !self.accounts.exists(ext_id.account_id()) {
                problems.push(ConsistencyProblem::error(format!(
                    "External ID '{key}' belongs to account that does not exist: {}",
                    ext_id.account_id()
                )));
            }
            if let Some(email) = ext_id.email() {
                if is_valid_email(email) {
                    keys_by_email.entry(email.to_string()).or_default().push(key.clone());
                } else {
                    problems.push(ConsistencyProblem::error(format!(
                        "External ID '{key}' has an invalid email: {email}"
                    )));
                }
            }
            if ext_id.is_scheme(scheme::USERNAME) {
                let username = ext_id.key().local_id();
                if !is_valid_username(username) {
                    problems.push(ConsistencyProblem::error(format!(
                        "External ID '{key}' has an invalid username: {username}"
                    )));
                }
                if let Some(secret) = ext_id.hashed_secret() {
                    if let Err(reason) = check_hashed_secret(secret) {
                        problems.push(ConsistencyProblem::error(format!(
                            "External ID '{key}' has an invalid password: {reason}"
                        )));
                    }
                }
            }
        }

        for (email, mut keys) in keys_by_email {
            if keys.len() > 1 {
                keys.sort();
                problems.push(ConsistencyProblem::error(format!(
                    "Email '{email}' is not unique, it's used by the following external IDs: {}",
                    keys.iter()
                        .map(|k| format!("'{k}'"))
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
        }

        Ok(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use extid_model::{ExternalId, ExternalIdKey, KeyFactory};
    use extid_notes::ExternalIdNotes;
    use extid_repo::Ident;

    struct FixedAccounts(Vec<AccountId>);

    impl AccountResolver for FixedAccounts {
        fn exists(&self, account: AccountId) -> bool {
            self.0.contains(&account)
        }
    }

    fn seed(repo: &NotesRepo, ids: Vec<ExternalId>) {
        let mut notes = ExternalIdNotes::new(repo.clone(), KeyFactory::new(false));
        notes.load().unwrap();
        notes.insert(ids).unwrap();
        notes
            .commit(
                Ident::new("Identity Service", "identities@service.example", Utc::now()),
                "seed",
            )
            .unwrap();
    }

    fn ext_id(scheme_name: &str, id: &str, account: u32) -> ExternalId {
        let key = ExternalIdKey::create(Some(scheme_name), id).unwrap();
        ExternalId::new(key, AccountId::new(account))
    }

    fn checker(repo: &NotesRepo, accounts: Vec<u32>) -> ConsistencyChecker {
        ConsistencyChecker::new(
            repo.clone(),
            Box::new(FixedAccounts(
                accounts.into_iter().map(AccountId::new).collect(),
            )),
        )
    }

    #[test]
    fn healthy_state_reports_nothing() {
        let repo = NotesRepo::in_memory();
        seed(
            &repo,
            vec![
                ext_id(scheme::USERNAME, "jdoe", 1).with_secret(
                    "bcrypt:4:LCbmSBDivK/hhGVQMfkDpA==:XcWn0pKYSVU/UJgOvhidkEtmqCp6oKB7",
                ),
                ext_id(scheme::MAILTO, "j@example.com", 1).with_email("j@example.com"),
            ],
        );
        assert!(checker(&repo, vec![1]).check().unwrap().is_empty());
    }

    #[test]
    fn missing_account_is_reported() {
        let repo = NotesRepo::in_memory();
        seed(&repo, vec![ext_id(scheme::USERNAME, "jdoe", 7)]);
        let problems = checker(&repo, vec![1]).check().unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].status, ProblemStatus::Error);
        assert_eq!(
            problems[0].message,
            "External ID 'username:jdoe' belongs to account that does not exist: 7"
        );
    }

    #[test]
    fn invalid_email_and_password_are_reported() {
        let repo = NotesRepo::in_memory();
        seed(
            &repo,
            vec![
                ext_id(scheme::USERNAME, "jdoe", 1).with_secret("plaintext"),
                ext_id(scheme::MAILTO, "bad", 1).with_email("not-an-email"),
            ],
        );
        let problems = checker(&repo, vec![1]).check().unwrap();
        let messages: Vec<&str> = problems.iter().map(|p| p.message.as_str()).collect();
        assert_eq!(problems.len(), 2);
        assert!(messages
            .iter()
            .any(|m| m.contains("'mailto:bad' has an invalid email")));
        assert!(messages
            .iter()
            .any(|m| m.contains("'username:jdoe' has an invalid password")));
    }

    #[test]
    fn malformed_username_is_reported() {
        let repo = NotesRepo::in_memory();
        seed(
            &repo,
            vec![
                ext_id(scheme::USERNAME, "jdoe.", 1),
                // Non-username schemes get no grammar check on the local ID.
                ext_id(scheme::EXTERNAL, "opaque..token-", 1),
            ],
        );
        let problems = checker(&repo, vec![1]).check().unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(
            problems[0].message,
            "External ID 'username:jdoe.' has an invalid username: jdoe."
        );
    }

    #[test]
    fn duplicate_email_lists_offending_keys_sorted() {
        let repo = NotesRepo::in_memory();
        seed(
            &repo,
            vec![
                ext_id(scheme::USERNAME, "zed", 1).with_email("shared@example.com"),
                ext_id(scheme::MAILTO, "shared@example.com", 2).with_email("shared@example.com"),
                ext_id(scheme::UUID, "u-1", 3).with_email("shared@example.com"),
            ],
        );
        let problems = checker(&repo, vec![1, 2, 3]).check().unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(
            problems[0].message,
            "Email 'shared@example.com' is not unique, it's used by the following external IDs: \
             'mailto:shared@example.com', 'username:zed', 'uuid:u-1'"
        );
    }

    #[test]
    fn unparseable_note_is_a_problem_not_an_error() {
        let repo = NotesRepo::in_memory();
        seed(&repo, vec![ext_id(scheme::USERNAME, "jdoe", 1)]);

        // Corrupt one extra note out of band.
        let rev = repo.resolve(REFS_EXTERNAL_IDS).unwrap();
        let mut notes = NoteMap::read(&repo, rev).unwrap();
        let garbage = repo.write_blob(b"garbage").unwrap();
        notes.set(extid_types::ObjectId::from_hash([9; 32]), garbage);
        let tree = notes.write_tree(&repo).unwrap();
        let new_rev = repo
            .write_commit(&extid_repo::Commit {
                tree,
                parents: vec![rev],
                author: Ident::new("x", "x@example.com", Utc::now()),
                committer: Ident::new("x", "x@example.com", Utc::now()),
                message: "corrupt".to_string(),
            })
            .unwrap();
        repo.update_ref(REFS_EXTERNAL_IDS, rev, new_rev).unwrap();

        let problems = checker(&repo, vec![1]).check().unwrap();
        assert_eq!(problems.len(), 1);
        assert!(problems[0]
            .message
            .starts_with("Invalid external ID config for note"));
    }
}
