//! Bounding the depth of the identities branch.

use chrono::{Duration, Utc};
use extid_cache::ExternalIdCache;
use extid_repo::{Commit, NotesRepo, REFS_EXTERNAL_IDS};
use extid_types::ObjectId;
use tracing::info;

use crate::error::{MaintError, MaintResult};

pub const DEFAULT_RETENTION_DAYS: i64 = 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PruneOutcome {
    Pruned {
        old_tip: ObjectId,
        new_tip: ObjectId,
        /// Commits surviving on the rewritten branch.
        retained: usize,
        /// Commits dropped from history.
        dropped: usize,
    },
    NothingToPrune,
}

/// Rewrites the branch so its history reaches back one commit past the
/// retention window and no further.
///
/// Commits with a committer timestamp inside the window are kept; of the
/// older ones only the newest survives, rewritten to have no parent, so
/// one step of pre-window ancestry remains visible. Every retained commit
/// keeps its tree, idents, and message; the tip's content is unchanged.
pub struct HistoryPruner {
    repo: NotesRepo,
    retention: Duration,
}

impl HistoryPruner {
    pub fn new(repo: NotesRepo) -> Self {
        Self {
            repo,
            retention: Duration::days(DEFAULT_RETENTION_DAYS),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Prune and, on success, carry the cached tip snapshot over to the
    /// rewritten tip. The ref update is a compare-and-swap against the
    /// tip observed at the start, so a concurrent writer makes this fail
    /// with a lock failure rather than losing their commit.
    pub fn prune(&self, cache: &dyn ExternalIdCache) -> MaintResult<PruneOutcome> {
        let old_tip = self.repo.resolve(REFS_EXTERNAL_IDS)?;
        if old_tip.is_zero() {
            return Ok(PruneOutcome::NothingToPrune);
        }

        // Tip-first walk of the whole branch.
        let mut commits: Vec<Commit> = Vec::new();
        let mut cursor = Some(old_tip);
        while let Some(rev) = cursor {
            let commit = self.repo.read_commit(&rev)?;
            if commit.parents.len() > 1 {
                return Err(MaintError::MergeCommit(rev));
            }
            cursor = commit.first_parent();
            commits.push(commit);
        }

        let cutoff = Utc::now() - self.retention;
        let recent: Vec<&Commit> = commits
            .iter()
            .take_while(|c| c.committer.when >= cutoff)
            .collect();
        let old = &commits[recent.len()..];
        // With one pre-window commit the rewrite would reproduce the
        // branch as-is; only two or more leave something to drop.
        if old.len() < 2 {
            return Ok(PruneOutcome::NothingToPrune);
        }

        // The newest pre-window commit becomes the new root.
        let boundary = &old[0];
        let mut parent = self.repo.write_commit(&Commit {
            tree: boundary.tree,
            parents: Vec::new(),
            author: boundary.author.clone(),
            committer: boundary.committer.clone(),
            message: boundary.message.clone(),
        })?;
        for commit in recent.iter().rev() {
            parent = self.repo.write_commit(&Commit {
                tree: commit.tree,
                parents: vec![parent],
                author: commit.author.clone(),
                committer: commit.committer.clone(),
                message: commit.message.clone(),
            })?;
        }
        let new_tip = parent;

        self.repo.update_ref(REFS_EXTERNAL_IDS, old_tip, new_tip)?;
        // Same tree, new commit ID; the cached snapshot is still valid.
        cache.on_rekey(old_tip, new_tip)?;

        let retained = recent.len() + 1;
        let dropped = old.len() - 1;
        info!(
            old_tip = %old_tip.short_hex(),
            new_tip = %new_tip.short_hex(),
            retained,
            dropped,
            "pruned external IDs branch history"
        );
        Ok(PruneOutcome::Pruned {
            old_tip,
            new_tip,
            retained,
            dropped,
        })
    }
}
