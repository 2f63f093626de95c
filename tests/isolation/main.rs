//! Isolation Integration Tests
//!
//! Scenarios against a real SQLite database: dirty-read visibility per level,
//! barrier determinism, hang detection, provisioning and level mapping.

#[path = "../common/mod.rs"]
mod common;

mod determinism;
mod dirty_read;
mod hang;
mod mapping;
mod properties;
mod provisioning;
mod read_committed;
