use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Numeric identifier of an account.
///
/// Rendered as plain decimal text wherever it is persisted (note content,
/// commit footers).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(u32);

impl AccountId {
    /// Create an account ID from its raw numeric value.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw numeric value.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| TypeError::InvalidAccountId(s.to_string()))
    }
}
