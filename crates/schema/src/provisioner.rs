//! Schema provisioner
//!
//! Provisioning is synchronous and serialized process-wide: concurrent
//! callers apply each migration at most once. It runs through an ordinary
//! SERIALIZABLE session, so it works against any engine a factory serves.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use isolab_core::{Engine, Error, IsolationLevel, Result, SqlValue};
use isolab_session::{Session, SessionFactory};

use crate::migration::{migrations_for, Migration};

static PROVISION_LOCK: Mutex<()> = parking_lot::const_mutex(());

const HISTORY_SQLITE: &str = "CREATE TABLE IF NOT EXISTS schema_history (
    version      INTEGER PRIMARY KEY,
    description  TEXT    NOT NULL,
    checksum     BIGINT  NOT NULL,
    installed_at TEXT    NOT NULL
)";

const HISTORY_MYSQL: &str = "CREATE TABLE IF NOT EXISTS schema_history (
    version      INT          NOT NULL PRIMARY KEY,
    description  VARCHAR(255) NOT NULL,
    checksum     BIGINT       NOT NULL,
    installed_at VARCHAR(64)  NOT NULL
) ENGINE = InnoDB";

/// A row of `schema_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    /// Migration version
    pub version: u32,
    /// Description at the time it was applied
    pub description: String,
    /// CRC32 of the script that was applied
    pub checksum: u32,
    /// RFC 3339 timestamp
    pub installed_at: String,
}

/// Outcome of [`SchemaProvisioner::migrate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Versions applied by this call, in order
    pub applied: Vec<u32>,
    /// Schema version after the call
    pub current_version: u32,
}

impl MigrationReport {
    /// True if nothing was applied.
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Applies and inspects the embedded migrations.
pub struct SchemaProvisioner {
    factory: Arc<dyn SessionFactory>,
}

impl SchemaProvisioner {
    /// Provisioner for the endpoint behind `factory`.
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self { factory }
    }

    /// Migrations this provisioner applies.
    pub fn migrations(&self) -> &'static [Migration] {
        migrations_for(self.factory.engine())
    }

    fn session(&self) -> Result<Session> {
        self.factory
            .open_named("provisioner", IsolationLevel::Serializable)
    }

    /// Apply every pending migration.
    ///
    /// # Errors
    ///
    /// `Migration` if a script fails (its transaction is rolled back) or an
    /// applied script no longer matches its recorded checksum.
    pub fn migrate(&self) -> Result<MigrationReport> {
        let _guard = PROVISION_LOCK.lock();
        let engine = self.factory.engine();
        let mut session = self.session()?;

        session.execute_batch(history_ddl(engine))?;
        session.commit()?;

        let recorded = read_history(&mut session)?;
        session.commit()?;

        let mut applied = Vec::new();
        for migration in self.migrations() {
            if let Some(prior) = recorded.iter().find(|r| r.version == migration.version) {
                check_checksum(migration, prior)?;
                continue;
            }
            apply(&mut session, migration).map_err(|e| {
                let _ = session.rollback();
                Error::Migration {
                    version: migration.version,
                    reason: e.to_string(),
                }
            })?;
            info!(
                target: "isolab::schema",
                version = migration.version,
                description = migration.description,
                "applied migration"
            );
            applied.push(migration.version);
        }
        session.close()?;

        let current_version = self
            .migrations()
            .last()
            .map(|m| m.version)
            .unwrap_or(0);
        if applied.is_empty() {
            debug!(target: "isolab::schema", version = current_version, "Schema up to date");
        }
        Ok(MigrationReport {
            applied,
            current_version,
        })
    }

    /// Highest applied version, 0 on a blank database.
    pub fn current_version(&self) -> Result<u32> {
        Ok(self
            .applied()?
            .iter()
            .map(|m| m.version)
            .max()
            .unwrap_or(0))
    }

    /// Rows of `schema_history`, oldest first. Empty on a blank database.
    pub fn applied(&self) -> Result<Vec<AppliedMigration>> {
        let mut session = self.session()?;
        let rows = if history_exists(&mut session, self.factory.engine())? {
            read_history(&mut session)?
        } else {
            Vec::new()
        };
        session.close()?;
        Ok(rows)
    }

    /// Check that every applied migration still matches its embedded script
    /// and that nothing is pending.
    pub fn validate(&self) -> Result<()> {
        let recorded = self.applied()?;
        for migration in self.migrations() {
            match recorded.iter().find(|r| r.version == migration.version) {
                Some(prior) => check_checksum(migration, prior)?,
                None => {
                    return Err(Error::Migration {
                        version: migration.version,
                        reason: "pending".to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Delete every account, keeping the schema. Generated ids restart at 1.
    pub fn truncate(&self) -> Result<()> {
        let _guard = PROVISION_LOCK.lock();
        let mut session = self.session()?;
        session.execute_batch(match self.factory.engine() {
            Engine::Sqlite => {
                "DELETE FROM account; DELETE FROM sqlite_sequence WHERE name = 'account'"
            }
            Engine::MySql => "TRUNCATE TABLE account",
        })?;
        session.commit()?;
        session.close()?;
        debug!(target: "isolab::schema", "Truncated account");
        Ok(())
    }

    /// Drop the schema, history included. The next `migrate` starts from V1.
    pub fn reset(&self) -> Result<()> {
        let _guard = PROVISION_LOCK.lock();
        let mut session = self.session()?;
        session.execute_batch("DROP TABLE IF EXISTS account; DROP TABLE IF EXISTS schema_history")?;
        session.commit()?;
        session.close()?;
        info!(target: "isolab::schema", "Schema dropped");
        Ok(())
    }
}

fn history_ddl(engine: Engine) -> &'static str {
    match engine {
        Engine::Sqlite => HISTORY_SQLITE,
        Engine::MySql => HISTORY_MYSQL,
    }
}

fn history_exists(session: &mut Session, engine: Engine) -> Result<bool> {
    let sql = match engine {
        Engine::Sqlite => {
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_history'"
        }
        Engine::MySql => {
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = 'schema_history'"
        }
    };
    let rows = session.query_sql(sql, &[])?;
    Ok(rows
        .first()
        .and_then(|r| r.first())
        .and_then(SqlValue::as_i64)
        .unwrap_or(0)
        > 0)
}

fn read_history(session: &mut Session) -> Result<Vec<AppliedMigration>> {
    let rows = session.query_sql(
        "SELECT version, description, checksum, installed_at FROM schema_history ORDER BY version",
        &[],
    )?;
    rows.into_iter()
        .map(|row| -> Result<AppliedMigration> {
            let int = |i: usize| row.get(i).and_then(SqlValue::as_i64);
            let text = |i: usize| {
                row.get(i)
                    .and_then(SqlValue::as_str)
                    .map(str::to_string)
                    .unwrap_or_default()
            };
            let version = int(0)
                .ok_or_else(|| Error::invalid_state("schema_history row without version"))?;
            Ok(AppliedMigration {
                version: version as u32,
                description: text(1),
                checksum: int(2).unwrap_or(0) as u32,
                installed_at: text(3),
            })
        })
        .collect()
}

fn check_checksum(migration: &Migration, prior: &AppliedMigration) -> Result<()> {
    if prior.checksum != migration.checksum() {
        return Err(Error::Migration {
            version: migration.version,
            reason: format!(
                "checksum mismatch: applied {:08x}, embedded {:08x}",
                prior.checksum,
                migration.checksum()
            ),
        });
    }
    Ok(())
}

fn apply(session: &mut Session, migration: &Migration) -> Result<()> {
    session.execute_batch(migration.sql)?;
    session.execute_sql(
        "INSERT INTO schema_history (version, description, checksum, installed_at) VALUES (?, ?, ?, ?)",
        &[
            SqlValue::Int(i64::from(migration.version)),
            SqlValue::from(migration.description),
            SqlValue::Int(i64::from(migration.checksum())),
            SqlValue::Text(Utc::now().to_rfc3339()),
        ],
    )?;
    session.commit()
}
