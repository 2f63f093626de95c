//! Session layer for isolab
//!
//! A session is one physical connection with manual transaction control and
//! a pinned isolation level:
//! - Connection / Interrupt: engine seam implemented per backend
//! - IsolationController: resolves a requested level against the engine's
//!   capability table
//! - Session: transaction state machine over a connection
//! - SessionFactory: opens sessions (SQLite always, MySQL behind `mysql`)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod controller;
pub mod factory;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod session;
pub mod sqlite;

pub use connection::{Connection, Interrupt, InterruptHandle, Row};
pub use controller::IsolationController;
pub use factory::{open_factory, SessionFactory};
#[cfg(feature = "mysql")]
pub use mysql::MySqlSessionFactory;
pub use session::Session;
pub use sqlite::SqliteSessionFactory;
