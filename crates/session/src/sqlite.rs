//! SQLite sessions
//!
//! The database file runs in WAL mode. SQLite only exposes uncommitted rows
//! between connections that share a page cache and have
//! `PRAGMA read_uncommitted` on, so:
//!
//! - READ UNCOMMITTED sessions open on the shared cache with
//!   `read_uncommitted = 1`
//! - every other level opens a private cache and reads the last committed
//!   WAL snapshot
//!
//! A connection's cache mode is fixed when it opens. Moving a session across
//! that line with `set_isolation` is reported as unsupported.
//!
//! Lock waits:
//!
//! - across caches SQLite reports `SQLITE_BUSY` and `busy_timeout` waits
//! - inside the shared cache a table-lock conflict reports `SQLITE_LOCKED`
//!   at once, so single statements are retried with backoff until the busy
//!   timeout runs out
//!
//! `BEGIN` is sent with the first statement of a transaction. A transaction
//! that opens with a locking read starts `IMMEDIATE`, which takes the write
//! lock before anything is read.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rusqlite::types::Value;
use rusqlite::{params_from_iter, ErrorCode, OpenFlags};
use tracing::{debug, info};

use isolab_core::{
    Engine, Error, HarnessConfig, IsolationLevel, Result, SqlValue, WriteOutcome,
};

use crate::connection::{Connection, Interrupt, InterruptHandle, Row};
use crate::controller::IsolationController;
use crate::factory::{SessionFactory, SessionIds};
use crate::session::Session;

const LOCKED_BACKOFF_MIN: Duration = Duration::from_millis(1);
const LOCKED_BACKOFF_MAX: Duration = Duration::from_millis(10);

/// Session factory over one SQLite database file.
#[derive(Debug)]
pub struct SqliteSessionFactory {
    path: PathBuf,
    busy_timeout: Duration,
    controller: IsolationController,
    ids: SessionIds,
}

impl SqliteSessionFactory {
    /// Prepare the database at `path` (created if missing) and switch it to
    /// WAL mode.
    pub fn new(path: impl AsRef<Path>, busy_timeout: Duration, allow_strengthened: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&path).map_err(|e| Error::Connection {
            reason: format!("failed to open '{}': {}", path.display(), e),
        })?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| Error::Connection {
                reason: format!("failed to enable WAL on '{}': {}", path.display(), e),
            })?;
        if !mode.eq_ignore_ascii_case("wal") {
            return Err(Error::Connection {
                reason: format!("'{}' refused WAL mode (journal_mode = {})", path.display(), mode),
            });
        }
        conn.close().map_err(|(_, e)| Error::Connection {
            reason: e.to_string(),
        })?;
        info!(target: "isolab::session", path = %path.display(), "SQLite database ready");
        Ok(Self {
            path,
            busy_timeout,
            controller: IsolationController::new(Engine::Sqlite, allow_strengthened),
            ids: SessionIds::default(),
        })
    }

    /// Factory for the `[sqlite]` section of `config`.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        Self::new(
            &config.sqlite.path,
            config.busy_timeout(),
            config.coordinator.allow_strengthened,
        )
    }

    /// Database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self, shared_cache: bool) -> Result<SqliteConnection> {
        let cache = if shared_cache {
            OpenFlags::SQLITE_OPEN_SHARED_CACHE | OpenFlags::SQLITE_OPEN_FULL_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_PRIVATE_CACHE | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | cache;
        let conn = rusqlite::Connection::open_with_flags(&self.path, flags).map_err(|e| {
            Error::Connection {
                reason: format!("failed to open '{}': {}", self.path.display(), e),
            }
        })?;
        conn.busy_timeout(self.busy_timeout).map_err(connection_error)?;
        conn.execute_batch(
            "
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )
        .map_err(connection_error)?;
        Ok(SqliteConnection {
            conn,
            shared_cache,
            busy_timeout: self.busy_timeout,
            interrupted: Arc::new(AtomicBool::new(false)),
            read_only: false,
            pending_begin: false,
            write_locked: false,
        })
    }
}

impl SessionFactory for SqliteSessionFactory {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn controller(&self) -> IsolationController {
        self.controller
    }

    fn open_named(&self, name: &str, level: IsolationLevel) -> Result<Session> {
        let effective = self.controller.resolve(level)?;
        let conn = self.connect(effective == IsolationLevel::ReadUncommitted)?;
        Session::establish(self.ids.next(), name, self.controller, level, Box::new(conn))
    }
}

/// One SQLite connection.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    shared_cache: bool,
    busy_timeout: Duration,
    interrupted: Arc<AtomicBool>,
    read_only: bool,
    // BEGIN is owed to the first statement of the transaction
    pending_begin: bool,
    // The open transaction holds the database write lock
    write_locked: bool,
}

impl SqliteConnection {
    fn end_transaction(&mut self) -> Result<()> {
        self.pending_begin = false;
        self.write_locked = false;
        if self.read_only {
            self.read_only = false;
            self.conn
                .pragma_update(None, "query_only", false)
                .map_err(statement_error)?;
        }
        Ok(())
    }

    fn open_transaction(&mut self, immediate: bool) -> Result<()> {
        if self.pending_begin {
            let sql = if immediate { "BEGIN IMMEDIATE" } else { "BEGIN DEFERRED" };
            self.retry_locked(|conn| conn.execute_batch(sql))?;
            self.pending_begin = false;
            self.write_locked = immediate;
        }
        Ok(())
    }

    /// Run `op`, retrying shared-cache lock conflicts until the busy timeout.
    ///
    /// Only for single statements: a failed statement changed nothing, so
    /// running it again is safe.
    fn retry_locked<T>(
        &self,
        mut op: impl FnMut(&rusqlite::Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let give_up = Instant::now() + self.busy_timeout;
        let mut backoff = LOCKED_BACKOFF_MIN;
        loop {
            match op(&self.conn) {
                Err(e) if e.sqlite_error_code() == Some(ErrorCode::DatabaseLocked) => {
                    if self.interrupted.load(Ordering::Acquire) {
                        return Err(Error::statement("interrupted"));
                    }
                    let now = Instant::now();
                    if now >= give_up {
                        return Err(Error::Conflict {
                            reason: format!("{} (still locked after {:?})", e, self.busy_timeout),
                        });
                    }
                    thread::sleep(backoff.min(give_up - now));
                    backoff = (backoff * 2).min(LOCKED_BACKOFF_MAX);
                }
                other => return other.map_err(statement_error),
            }
        }
    }

    fn run_query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.retry_locked(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns = stmt.column_count();
            let rows = stmt.query_map(params_from_iter(params.iter().map(to_value)), |row| {
                (0..columns)
                    .map(|i| row.get::<_, Value>(i).map(from_value))
                    .collect::<rusqlite::Result<Row>>()
            })?;
            rows.collect::<rusqlite::Result<Vec<Row>>>()
        })
    }
}

impl Connection for SqliteConnection {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn apply_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        let wants_shared = level == IsolationLevel::ReadUncommitted;
        if wants_shared != self.shared_cache {
            return Err(Error::UnsupportedIsolation {
                level,
                engine: Engine::Sqlite,
                reason: format!(
                    "connection was opened on a {} cache; open a new session instead",
                    if self.shared_cache { "shared" } else { "private" }
                ),
            });
        }
        self.conn
            .pragma_update(None, "read_uncommitted", wants_shared)
            .map_err(statement_error)?;
        debug!(target: "isolab::session", shared_cache = self.shared_cache, level = %level, "Applied isolation");
        Ok(())
    }

    fn begin(&mut self, read_only: bool) -> Result<()> {
        self.interrupted.store(false, Ordering::Release);
        if read_only {
            self.conn
                .pragma_update(None, "query_only", true)
                .map_err(statement_error)?;
            self.read_only = true;
        }
        self.pending_begin = true;
        self.write_locked = false;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if !self.pending_begin {
            self.retry_locked(|conn| conn.execute_batch("COMMIT"))?;
        }
        self.end_transaction()
    }

    fn rollback(&mut self) -> Result<()> {
        // An interrupted write rolls the transaction back on its own.
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK").map_err(statement_error)?;
        }
        self.end_transaction()
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<WriteOutcome> {
        self.open_transaction(false)?;
        let rows = self.retry_locked(|conn| {
            conn.execute(sql, params_from_iter(params.iter().map(to_value)))
        })?;
        self.write_locked = true;
        let is_insert = sql
            .trim_start()
            .get(..6)
            .map_or(false, |head| head.eq_ignore_ascii_case("insert"));
        Ok(WriteOutcome {
            rows_affected: rows as u64,
            last_insert_id: is_insert.then(|| self.conn.last_insert_rowid()),
        })
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.open_transaction(false)?;
        self.run_query(sql, params)
    }

    fn query_for_update(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        // No row locks in SQLite: the database write lock stands in for them.
        if self.pending_begin {
            self.open_transaction(true)?;
        } else if !self.write_locked {
            return Err(Error::statement(
                "SQLite locks for update only at the start of a transaction or after a write",
            ));
        }
        self.run_query(sql, params)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.open_transaction(false)?;
        self.conn.execute_batch(sql).map_err(statement_error)
    }

    fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle::new(SqliteInterrupt {
            handle: self.conn.get_interrupt_handle(),
            interrupted: Arc::clone(&self.interrupted),
        })
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Connection {
            reason: format!("failed to close connection: {}", e),
        })
    }
}

struct SqliteInterrupt {
    handle: rusqlite::InterruptHandle,
    // Also stops a statement waiting out a shared-cache lock
    interrupted: Arc<AtomicBool>,
}

impl Interrupt for SqliteInterrupt {
    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.handle.interrupt();
    }
}

fn to_value(v: &SqlValue) -> Value {
    match v {
        SqlValue::Null => Value::Null,
        SqlValue::Int(i) => Value::Integer(*i),
        SqlValue::Real(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
    }
}

fn from_value(v: Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Int(i),
        Value::Real(f) => SqlValue::Real(f),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Text(String::from_utf8_lossy(&b).into_owned()),
    }
}

fn statement_error(e: rusqlite::Error) -> Error {
    match e.sqlite_error_code() {
        Some(ErrorCode::OperationInterrupted) => Error::statement("interrupted"),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Error::Conflict {
            reason: e.to_string(),
        },
        _ => Error::statement(e.to_string()),
    }
}

fn connection_error(e: rusqlite::Error) -> Error {
    Error::Connection {
        reason: e.to_string(),
    }
}
