//! Core types for isolab
//!
//! This crate defines the vocabulary shared by every other crate:
//! - IsolationLevel: the four SQL-standard isolation levels
//! - Engine / Capabilities: per-engine capability table (what each level really does)
//! - Write / Query: the statements a scenario step can issue against the account table
//! - SqlValue: engine-neutral column value
//! - SessionId / RunId / TransactionState: identity and lifecycle types
//! - HarnessConfig: `isolab.toml` configuration
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod isolation;
pub mod statement;
pub mod types;

pub use config::{CoordinatorConfig, HarnessConfig, MySqlConfig, SqliteConfig, CONFIG_FILE_NAME};
pub use engine::{Capabilities, DirtyReads, Engine, Support};
pub use error::{AnomalyMismatch, Error, ExpectedKind, HangCause, Result};
pub use isolation::IsolationLevel;
pub use statement::{AccountId, Query, SqlValue, Write, WriteOutcome};
pub use types::{RunId, SessionId, TransactionState};
