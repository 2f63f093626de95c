//! Access Layer Integration Tests
//!
//! The account DAO, the template-driven repository and the transfer
//! workload over a real SQLite database.

#[path = "../common/mod.rs"]
mod common;

mod dao;
mod repository;
mod workload;
