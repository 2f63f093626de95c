//! MySQL (InnoDB) sessions
//!
//! One `mysql::Conn` per session. The isolation level is set at session
//! scope and autocommit is turned off right after connecting; transactions
//! start with `START TRANSACTION [READ ONLY]`.
//!
//! Interrupts run `KILL QUERY <id>` from a separate connection, which makes
//! the blocked statement fail on the session's own thread.

use std::sync::Arc;

use mysql::prelude::Queryable;
use mysql::{Conn, Opts, Params, Value};
use tracing::{debug, info, warn};

use isolab_core::{
    Engine, Error, HarnessConfig, IsolationLevel, Result, SqlValue, WriteOutcome,
};

use crate::connection::{Connection, Interrupt, InterruptHandle, Row};
use crate::controller::IsolationController;
use crate::factory::{SessionFactory, SessionIds};
use crate::session::Session;

/// Session factory over one MySQL endpoint.
#[derive(Debug)]
pub struct MySqlSessionFactory {
    opts: Opts,
    controller: IsolationController,
    ids: SessionIds,
}

impl MySqlSessionFactory {
    /// Factory for the endpoint at `url`. Nothing connects until a session opens.
    pub fn new(url: &str, allow_strengthened: bool) -> Result<Self> {
        let opts = Opts::from_url(url).map_err(|e| Error::Config {
            reason: format!("invalid MySQL url: {}", e),
        })?;
        info!(target: "isolab::session", host = %opts.get_ip_or_hostname(), "MySQL endpoint configured");
        Ok(Self {
            opts,
            controller: IsolationController::new(Engine::MySql, allow_strengthened),
            ids: SessionIds::default(),
        })
    }

    /// Factory for the `[mysql]` section of `config`.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let mysql = config.mysql.as_ref().ok_or_else(|| Error::Config {
            reason: "missing [mysql] section".to_string(),
        })?;
        Self::new(&mysql.url, config.coordinator.allow_strengthened)
    }
}

impl SessionFactory for MySqlSessionFactory {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn controller(&self) -> IsolationController {
        self.controller
    }

    fn open_named(&self, name: &str, level: IsolationLevel) -> Result<Session> {
        // Resolve first so an unsupported level never costs a connection.
        self.controller.resolve(level)?;
        let mut conn = Conn::new(self.opts.clone()).map_err(connection_error)?;
        conn.query_drop("SET autocommit = 0")
            .map_err(connection_error)?;
        let conn = MySqlConnection {
            conn,
            opts: Arc::new(self.opts.clone()),
        };
        Session::establish(self.ids.next(), name, self.controller, level, Box::new(conn))
    }
}

/// One MySQL connection.
pub struct MySqlConnection {
    conn: Conn,
    opts: Arc<Opts>,
}

impl Connection for MySqlConnection {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn apply_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        self.conn
            .query_drop(format!("SET SESSION TRANSACTION ISOLATION LEVEL {}", level.as_sql()))
            .map_err(statement_error)?;
        debug!(target: "isolab::session", connection_id = self.conn.connection_id(), level = %level, "Applied isolation");
        Ok(())
    }

    fn begin(&mut self, read_only: bool) -> Result<()> {
        let sql = if read_only {
            "START TRANSACTION READ ONLY"
        } else {
            "START TRANSACTION"
        };
        self.conn.query_drop(sql).map_err(statement_error)
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.query_drop("COMMIT").map_err(statement_error)
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn.query_drop("ROLLBACK").map_err(statement_error)
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<WriteOutcome> {
        self.conn
            .exec_drop(sql, to_params(params))
            .map_err(statement_error)?;
        let last = self.conn.last_insert_id();
        Ok(WriteOutcome {
            rows_affected: self.conn.affected_rows(),
            last_insert_id: (last != 0).then_some(last as i64),
        })
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let rows: Vec<mysql::Row> = self
            .conn
            .exec(sql, to_params(params))
            .map_err(statement_error)?;
        Ok(rows
            .into_iter()
            .map(|row| row.unwrap().into_iter().map(from_value).collect())
            .collect())
    }

    fn query_for_update(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.query(&format!("{} FOR UPDATE", sql), params)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            self.conn.query_drop(statement).map_err(statement_error)?;
        }
        Ok(())
    }

    fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle::new(MySqlInterrupt {
            opts: Arc::clone(&self.opts),
            connection_id: self.conn.connection_id(),
        })
    }

    fn close(self: Box<Self>) -> Result<()> {
        drop(self.conn);
        Ok(())
    }
}

struct MySqlInterrupt {
    opts: Arc<Opts>,
    connection_id: u32,
}

impl Interrupt for MySqlInterrupt {
    fn interrupt(&self) {
        let killed = Conn::new((*self.opts).clone())
            .and_then(|mut c| c.query_drop(format!("KILL QUERY {}", self.connection_id)));
        if let Err(e) = killed {
            warn!(target: "isolab::session", connection_id = self.connection_id, error = %e, "KILL QUERY failed");
        }
    }
}

fn to_params(params: &[SqlValue]) -> Params {
    if params.is_empty() {
        return Params::Empty;
    }
    Params::Positional(
        params
            .iter()
            .map(|v| match v {
                SqlValue::Null => Value::NULL,
                SqlValue::Int(i) => Value::Int(*i),
                SqlValue::Real(f) => Value::Double(*f),
                SqlValue::Text(s) => Value::Bytes(s.as_bytes().to_vec()),
            })
            .collect(),
    )
}

// DECIMAL aggregates arrive as text; SqlValue::as_i64 parses them.
fn from_value(v: Value) -> SqlValue {
    match v {
        Value::NULL => SqlValue::Null,
        Value::Int(i) => SqlValue::Int(i),
        Value::UInt(u) => SqlValue::Int(u as i64),
        Value::Float(f) => SqlValue::Real(f as f64),
        Value::Double(d) => SqlValue::Real(d),
        Value::Bytes(b) => SqlValue::Text(String::from_utf8_lossy(&b).into_owned()),
        other => SqlValue::Text(other.as_sql(true)),
    }
}

const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
const ER_LOCK_DEADLOCK: u16 = 1213;

fn statement_error(e: mysql::Error) -> Error {
    match e {
        mysql::Error::IoError(_) | mysql::Error::DriverError(_) => connection_error(e),
        mysql::Error::MySqlError(ref server)
            if matches!(server.code, ER_LOCK_WAIT_TIMEOUT | ER_LOCK_DEADLOCK) =>
        {
            Error::Conflict {
                reason: e.to_string(),
            }
        }
        other => Error::statement(other.to_string()),
    }
}

fn connection_error(e: mysql::Error) -> Error {
    Error::Connection {
        reason: e.to_string(),
    }
}
