//! Schema provisioning for isolab
//!
//! Versioned SQL migrations are embedded per engine and applied in order.
//! Each applied migration is recorded in `schema_history` with a CRC32 of its
//! script, so re-running is a no-op and an edited script is caught.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod migration;
pub mod provisioner;

pub use migration::{migrations_for, Migration};
pub use provisioner::{AppliedMigration, MigrationReport, SchemaProvisioner};
