//! isolab - deterministic harness for transaction-isolation anomalies
//!
//! isolab opens real database sessions at chosen isolation levels, drives
//! them through barrier-ordered interleavings, and judges the observed
//! values against what each engine promises for the level.
//!
//! # Quick Start
//!
//! ```ignore
//! use isolab::{catalog, Coordinator, Fixture, IsolationLevel, SchemaProvisioner, SqliteSessionFactory};
//!
//! let factory = Arc::new(SqliteSessionFactory::new("isolab.db", Duration::from_secs(5), true)?);
//! SchemaProvisioner::new(factory.clone()).migrate()?;
//! let fixture = Fixture::default();
//! fixture.seed(factory.as_ref())?;
//!
//! let scenario = catalog::dirty_read_rollback(&fixture, IsolationLevel::ReadUncommitted).build()?;
//! let result = Coordinator::new(factory).run(&scenario)?;
//! assert_eq!(result.value("mid"), Some(50));
//! ```
//!
//! # Architecture
//!
//! Schema Provisioner → Session Factory → Isolation Controller (per session)
//! → Interleaving Coordinator → Assertion Layer. The account crate layers a
//! DAO and a template-driven repository over the same sessions.

pub use isolab_account::*;
pub use isolab_concurrency::*;
pub use isolab_core::*;
pub use isolab_schema::*;
pub use isolab_session::*;
