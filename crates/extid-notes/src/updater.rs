//! Retry orchestration for whole load-mutate-commit cycles.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use extid_model::{ExternalId, ExternalIdKey, KeyFactory};
use extid_repo::{Ident, RepoManager};
use extid_types::AccountId;
use rand::Rng;
use tracing::debug;

use crate::error::NotesResult;
use crate::metrics;
use crate::notes::{CommitOutcome, ExternalIdNotes};

/// Backoff for commits that lose the compare-and-swap race. Exponential
/// with a random jitter, bounded by an overall deadline.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Give up once this much time has passed since the first attempt.
    pub timeout: Duration,
    /// Delay before the first retry; doubles per retry.
    pub base_delay: Duration,
    /// Upper bound on the per-retry delay.
    pub max_delay: Duration,
    /// Upper bound on the random jitter added to each delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            max_jitter: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    fn jittered(&self, delay: Duration) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}

/// Runs external ID updates end to end: open the repository, load the
/// store, apply the caller's mutations, commit, and retry the whole cycle
/// when a concurrent writer advanced the branch first. The staged
/// mutations of a losing attempt were computed against a stale base, so
/// nothing short of a full re-run is sound.
pub struct ExternalIdsUpdater {
    repo_manager: Arc<dyn RepoManager>,
    repo_name: String,
    key_factory: KeyFactory,
    committer_name: String,
    committer_email: String,
    policy: RetryPolicy,
}

impl ExternalIdsUpdater {
    pub fn new(
        repo_manager: Arc<dyn RepoManager>,
        repo_name: impl Into<String>,
        key_factory: KeyFactory,
        committer_name: impl Into<String>,
        committer_email: impl Into<String>,
    ) -> Self {
        Self {
            repo_manager,
            repo_name: repo_name.into(),
            key_factory,
            committer_name: committer_name.into(),
            committer_email: committer_email.into(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// One full update cycle with retries. `mutate` is re-invoked against
    /// a freshly loaded store on every attempt and must be idempotent.
    pub fn update<F>(&self, message: &str, mutate: F) -> NotesResult<CommitOutcome>
    where
        F: Fn(&mut ExternalIdNotes) -> NotesResult<()>,
    {
        let deadline = Instant::now() + self.policy.timeout;
        let mut delay = self.policy.base_delay;
        loop {
            let repo = self.repo_manager.open(&self.repo_name)?;
            let mut notes = ExternalIdNotes::new(repo, self.key_factory);
            notes.load()?;
            mutate(&mut notes)?;

            let committer = Ident::new(&self.committer_name, &self.committer_email, Utc::now());
            match notes.commit(committer, message) {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && Instant::now() + delay < deadline => {
                    debug!("external IDs update lost the ref race, retrying: {e}");
                    metrics::update_retried();
                    std::thread::sleep(self.policy.jittered(delay));
                    delay = (delay * 2).min(self.policy.max_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn insert(&self, ids: Vec<ExternalId>) -> NotesResult<CommitOutcome> {
        self.update("Add external IDs", |notes| notes.insert(ids.clone()))
    }

    pub fn upsert(&self, ids: Vec<ExternalId>) -> NotesResult<CommitOutcome> {
        self.update("Update external IDs", |notes| notes.upsert(ids.clone()))
    }

    pub fn delete(&self, ids: Vec<ExternalId>) -> NotesResult<CommitOutcome> {
        self.update("Delete external IDs", |notes| notes.delete(ids.clone()))
    }

    pub fn delete_keys(
        &self,
        account: AccountId,
        keys: Vec<ExternalIdKey>,
    ) -> NotesResult<CommitOutcome> {
        self.update("Delete external IDs", |notes| {
            notes.delete_keys(account, keys.clone())
        })
    }

    pub fn replace(
        &self,
        account: AccountId,
        to_delete: Vec<ExternalIdKey>,
        to_add: Vec<ExternalId>,
    ) -> NotesResult<CommitOutcome> {
        self.update("Replace external IDs", |notes| {
            notes.replace(account, to_delete.clone(), to_add.clone())
        })
    }
}
