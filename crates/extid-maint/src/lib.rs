//! Maintenance operations for the identities branch.
//!
//! [`HistoryPruner`] bounds the branch's commit depth without changing its
//! content; [`ConsistencyChecker`] audits every stored record against the
//! account store and the field grammars.

pub mod check;
pub mod error;
pub mod prune;

pub use check::{AccountResolver, ConsistencyChecker, ConsistencyProblem, ProblemStatus};
pub use error::{MaintError, MaintResult};
pub use prune::{HistoryPruner, PruneOutcome, DEFAULT_RETENTION_DAYS};
