//! Identity and lifecycle types
//!
//! - SessionId: process-unique identifier of an opened session
//! - RunId: unique identifier of one scenario run
//! - TransactionState: lifecycle of a session's current transaction

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Process-unique identifier of an opened session.
///
/// Allocated by the session factory; used in log fields and results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Unique identifier of one scenario run
///
/// A RunId wraps a UUID v4. Repeated runs of the same scenario get distinct
/// ids so their log lines and results can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random RunId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a RunId from its string form
    ///
    /// Returns None if the string is not a valid UUID.
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a session's current transaction.
///
/// `Committed` and `RolledBack` describe the last transaction; a new
/// transaction may begin from either of them as well as from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionState {
    /// No transaction has started yet
    Idle,
    /// A transaction is open
    Active,
    /// The last transaction committed
    Committed,
    /// The last transaction rolled back
    RolledBack,
}

impl TransactionState {
    /// Check if a transaction is open
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionState::Idle => "idle",
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        })
    }
}
