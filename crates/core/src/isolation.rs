//! SQL-standard transaction isolation levels
//!
//! Levels are ordered from weakest to strongest, so `a < b` means `b`
//! forbids at least every anomaly `a` forbids.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Transaction isolation level requested for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    /// Dirty reads, non-repeatable reads and phantoms are permitted
    ReadUncommitted,
    /// Only committed data is visible
    ReadCommitted,
    /// Rows read once keep their value for the rest of the transaction
    RepeatableRead,
    /// Equivalent to some serial execution
    Serializable,
}

impl IsolationLevel {
    /// Every level, weakest first.
    pub const ALL: [IsolationLevel; 4] = [
        IsolationLevel::ReadUncommitted,
        IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead,
        IsolationLevel::Serializable,
    ];

    /// SQL spelling, as used in `SET TRANSACTION ISOLATION LEVEL ...`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }

    /// Kebab-case name used in configuration and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "read-uncommitted",
            IsolationLevel::ReadCommitted => "read-committed",
            IsolationLevel::RepeatableRead => "repeatable-read",
            IsolationLevel::Serializable => "serializable",
        }
    }

    /// Whether the standard contract of this level allows dirty reads.
    pub fn permits_dirty_reads(&self) -> bool {
        matches!(self, IsolationLevel::ReadUncommitted)
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for IsolationLevel {
    type Err = Error;

    /// Accepts `read-uncommitted`, `READ_UNCOMMITTED`, `read uncommitted`
    /// and the short forms `ru`, `rc`, `rr`, `s`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '_' | ' ' => '-',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        match normalized.as_str() {
            "read-uncommitted" | "ru" => Ok(IsolationLevel::ReadUncommitted),
            "read-committed" | "rc" => Ok(IsolationLevel::ReadCommitted),
            "repeatable-read" | "rr" => Ok(IsolationLevel::RepeatableRead),
            "serializable" | "s" => Ok(IsolationLevel::Serializable),
            _ => Err(Error::InvalidState {
                reason: format!("unknown isolation level '{}'", s),
            }),
        }
    }
}
