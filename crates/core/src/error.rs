//! Error types for isolab
//!
//! One enum for the whole workspace. Driver errors (`rusqlite`, `mysql`) are
//! mapped into it at the connection boundary so callers never see a
//! driver-specific type.

use serde::Serialize;
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::engine::Engine;
use crate::isolation::IsolationLevel;

/// Result type alias for isolab operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for isolab
#[derive(Debug, Error)]
pub enum Error {
    /// Endpoint unreachable or out of connections
    #[error("connection error: {reason}")]
    Connection {
        /// Driver message
        reason: String,
    },

    /// Operation not valid in the current state
    #[error("invalid state: {reason}")]
    InvalidState {
        /// What was wrong
        reason: String,
    },

    /// Engine cannot honor the requested isolation level
    #[error("{engine} cannot run {level}: {reason}")]
    UnsupportedIsolation {
        /// Requested level
        level: IsolationLevel,
        /// Engine that refused it
        engine: Engine,
        /// Why
        reason: String,
    },

    /// A barrier or the scenario deadline expired
    #[error("scenario '{scenario}' hung: {cause}{}", unresponsive_suffix(.unresponsive))]
    DeadlockOrHang {
        /// Scenario name
        scenario: String,
        /// What expired
        cause: HangCause,
        /// Sessions still inside a statement when the coordinator gave up on
        /// them; their threads are left to finish on their own
        unresponsive: Vec<String>,
    },

    /// Observed value contradicts the isolation level's contract
    #[error("{0}")]
    AnomalyMismatch(Box<AnomalyMismatch>),

    /// Statement failed on the engine (includes interrupted statements)
    #[error("statement failed: {reason}")]
    Statement {
        /// Engine message
        reason: String,
    },

    /// Lock conflict: deadlock, serialization failure or an exhausted lock
    /// wait. The transaction must be rolled back; running it again may succeed.
    #[error("transaction conflict: {reason}")]
    Conflict {
        /// Engine message
        reason: String,
    },

    /// Entity not found
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing entity
        what: String,
    },

    /// Migration failed or an applied migration changed
    #[error("migration V{version} failed: {reason}")]
    Migration {
        /// Migration version
        version: u32,
        /// What went wrong
        reason: String,
    },

    /// Configuration unreadable or invalid
    #[error("config error: {reason}")]
    Config {
        /// What went wrong
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the error comes from the environment rather than from the
    /// behavior under test. Such errors yield an infrastructure verdict, not
    /// an anomaly verdict.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, Error::AnomalyMismatch(_))
    }

    /// Whether running the whole transaction again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Shorthand for [`Error::InvalidState`].
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Error::InvalidState {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`Error::Statement`].
    pub fn statement(reason: impl Into<String>) -> Self {
        Error::Statement {
            reason: reason.into(),
        }
    }
}

impl From<AnomalyMismatch> for Error {
    fn from(m: AnomalyMismatch) -> Self {
        Error::AnomalyMismatch(Box::new(m))
    }
}

fn unresponsive_suffix(sessions: &[String]) -> String {
    if sessions.is_empty() {
        String::new()
    } else {
        format!(" (still running: {})", sessions.join(", "))
    }
}

/// What expired when a scenario hung.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum HangCause {
    /// A barrier did not fill up in time
    Barrier {
        /// Barrier name
        name: String,
        /// Sessions that arrived
        arrived: usize,
        /// Sessions the barrier waits for
        expected: usize,
        /// Per-barrier timeout
        timeout: Duration,
    },
    /// The scenario-wide deadline passed
    Deadline {
        /// Configured deadline
        deadline: Duration,
    },
}

impl fmt::Display for HangCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HangCause::Barrier {
                name,
                arrived,
                expected,
                timeout,
            } => write!(
                f,
                "barrier '{}' timed out after {:?} with {}/{} sessions arrived",
                name, timeout, arrived, expected
            ),
            HangCause::Deadline { deadline } => {
                write!(f, "scenario deadline of {:?} exceeded", deadline)
            }
        }
    }
}

/// What an expected value in an anomaly check stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpectedKind {
    /// Committed value before the writer started
    Baseline,
    /// Value written but not yet committed
    UncommittedWrite,
    /// Committed value once every session finished
    FinalValue,
}

impl fmt::Display for ExpectedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExpectedKind::Baseline => "committed baseline",
            ExpectedKind::UncommittedWrite => "uncommitted write",
            ExpectedKind::FinalValue => "final committed value",
        })
    }
}

/// Details of an observed value contradicting the expected one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnomalyMismatch {
    /// Scenario name
    pub scenario: String,
    /// Observing session
    pub observer: String,
    /// Label of the read
    pub read: String,
    /// Observer's isolation level
    pub level: IsolationLevel,
    /// Expected value
    pub expected: i64,
    /// What the expected value represents
    pub expected_kind: ExpectedKind,
    /// Value actually read (None if the read returned no row or never ran)
    pub observed: Option<i64>,
}

impl fmt::Display for AnomalyMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "anomaly mismatch in '{}': session '{}' read '{}' at {}, expected {} ({}), observed ",
            self.scenario, self.observer, self.read, self.level, self.expected, self.expected_kind
        )?;
        match self.observed {
            Some(v) => write!(f, "{}", v),
            None => f.write_str("nothing"),
        }
    }
}
