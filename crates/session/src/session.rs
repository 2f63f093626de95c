//! Session state machine
//!
//! ```text
//!   Idle ──begin──▶ Active ──commit──▶ Committed ──begin──▶ Active ...
//!                     │
//!                     └──rollback──▶ RolledBack ──begin──▶ Active ...
//! ```
//!
//! Autocommit is off for the whole lifetime of a session: a statement issued
//! outside a transaction implicitly begins one. Dropping a session with an
//! open transaction rolls it back.

use tracing::{debug, warn};

use isolab_core::{
    Engine, Error, IsolationLevel, Query, Result, SessionId, SqlValue, TransactionState, Write,
    WriteOutcome,
};

use crate::connection::{Connection, InterruptHandle, Row};
use crate::controller::IsolationController;

/// One connection with manual transaction control and a pinned isolation level.
pub struct Session {
    id: SessionId,
    name: String,
    controller: IsolationController,
    requested: IsolationLevel,
    effective: IsolationLevel,
    state: TransactionState,
    read_only: bool,
    conn: Option<Box<dyn Connection>>,
}

impl Session {
    /// Wrap a freshly opened connection and apply `requested` to it before
    /// any statement runs.
    ///
    /// # Errors
    ///
    /// `UnsupportedIsolation` if the level does not resolve, or whatever the
    /// connection reports while applying the directive. The connection is
    /// closed on failure.
    pub fn establish(
        id: SessionId,
        name: impl Into<String>,
        controller: IsolationController,
        requested: IsolationLevel,
        mut conn: Box<dyn Connection>,
    ) -> Result<Self> {
        let name = name.into();
        let effective = match controller.resolve(requested) {
            Ok(level) => level,
            Err(e) => {
                let _ = conn.close();
                return Err(e);
            }
        };
        if let Err(e) = conn.apply_isolation(effective) {
            let _ = conn.close();
            return Err(e);
        }
        debug!(
            target: "isolab::session",
            session = %id,
            name = %name,
            requested = %requested,
            effective = %effective,
            "Session opened"
        );
        Ok(Self {
            id,
            name,
            controller,
            requested,
            effective,
            state: TransactionState::Idle,
            read_only: false,
            conn: Some(conn),
        })
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Session name (scenario role, or a generated one).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Engine behind the session.
    pub fn engine(&self) -> Engine {
        self.controller.engine()
    }

    /// Level the caller asked for.
    pub fn requested_level(&self) -> IsolationLevel {
        self.requested
    }

    /// Level the engine runs.
    pub fn effective_level(&self) -> IsolationLevel {
        self.effective
    }

    /// Current transaction state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Whether the open (or last) transaction is read-only.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Handle that aborts this session's in-flight statement from another thread.
    pub fn interrupt_handle(&self) -> Result<InterruptHandle> {
        Ok(self.conn_ref()?.interrupt_handle())
    }

    /// Change the isolation level for subsequent transactions.
    ///
    /// # Errors
    ///
    /// `InvalidState` while a transaction is active; `UnsupportedIsolation`
    /// if the level does not resolve.
    pub fn set_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        if self.state.is_active() {
            return Err(Error::invalid_state(format!(
                "session '{}' cannot change isolation to {} inside an active transaction",
                self.name, level
            )));
        }
        let effective = self.controller.resolve(level)?;
        self.conn_mut()?.apply_isolation(effective)?;
        self.requested = level;
        self.effective = effective;
        Ok(())
    }

    /// Start a read-write transaction.
    pub fn begin(&mut self) -> Result<()> {
        self.start(false)
    }

    /// Start a read-only transaction.
    pub fn begin_read_only(&mut self) -> Result<()> {
        self.start(true)
    }

    fn start(&mut self, read_only: bool) -> Result<()> {
        if self.state.is_active() {
            return Err(Error::invalid_state(format!(
                "session '{}' already has an active transaction",
                self.name
            )));
        }
        self.conn_mut()?.begin(read_only)?;
        self.state = TransactionState::Active;
        self.read_only = read_only;
        debug!(target: "isolab::session", session = %self.id, read_only, "Transaction started");
        Ok(())
    }

    fn ensure_active(&mut self) -> Result<()> {
        if self.state.is_active() {
            Ok(())
        } else {
            self.start(false)
        }
    }

    /// Commit the active transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.require_active("commit")?;
        let result = self.conn_mut()?.commit();
        match result {
            Ok(()) => {
                self.state = TransactionState::Committed;
                debug!(target: "isolab::session", session = %self.id, "Transaction committed");
                Ok(())
            }
            Err(e) => {
                warn!(target: "isolab::session", session = %self.id, error = %e, "Commit failed, rolling back");
                self.rollback_quietly();
                Err(e)
            }
        }
    }

    /// Roll back the active transaction.
    pub fn rollback(&mut self) -> Result<()> {
        self.require_active("rollback")?;
        let result = self.conn_mut()?.rollback();
        self.state = TransactionState::RolledBack;
        debug!(target: "isolab::session", session = %self.id, "Transaction rolled back");
        result
    }

    fn require_active(&self, op: &str) -> Result<()> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(Error::invalid_state(format!(
                "session '{}' cannot {} while {}",
                self.name, op, self.state
            )))
        }
    }

    fn rollback_quietly(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            if let Err(e) = conn.rollback() {
                warn!(target: "isolab::session", session = %self.id, error = %e, "Rollback failed");
            }
        }
        self.state = TransactionState::RolledBack;
    }

    /// Run a write against the account table.
    pub fn write(&mut self, write: &Write) -> Result<WriteOutcome> {
        self.execute_sql(write.sql(), &write.params())
    }

    /// Run a single-value read against the account table.
    ///
    /// Returns `None` when the query yields no row or NULL.
    pub fn read(&mut self, query: &Query) -> Result<Option<i64>> {
        let rows = if query.is_locking() {
            self.query_for_update(query.sql(), &query.params())?
        } else {
            self.query_sql(query.sql(), &query.params())?
        };
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_i64))
    }

    /// Run a parameterized write, beginning a transaction if none is open.
    pub fn execute_sql(&mut self, sql: &str, params: &[SqlValue]) -> Result<WriteOutcome> {
        if self.state.is_active() && self.read_only {
            return Err(Error::invalid_state(format!(
                "session '{}' cannot write inside a read-only transaction",
                self.name
            )));
        }
        self.ensure_active()?;
        self.conn_mut()?.execute(sql, params)
    }

    /// Run a parameterized query, beginning a transaction if none is open.
    pub fn query_sql(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.ensure_active()?;
        self.conn_mut()?.query(sql, params)
    }

    /// Run a query whose rows stay locked until the transaction ends,
    /// beginning a transaction if none is open.
    ///
    /// # Errors
    ///
    /// `InvalidState` inside a read-only transaction.
    pub fn query_for_update(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        if self.state.is_active() && self.read_only {
            return Err(Error::invalid_state(format!(
                "session '{}' cannot lock rows inside a read-only transaction",
                self.name
            )));
        }
        self.ensure_active()?;
        self.conn_mut()?.query_for_update(sql, params)
    }

    /// Run `;`-separated statements, beginning a transaction if none is open.
    pub fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.ensure_active()?;
        self.conn_mut()?.execute_batch(sql)
    }

    /// Roll back any active transaction and release the connection.
    pub fn close(mut self) -> Result<()> {
        if self.state.is_active() {
            self.rollback_quietly();
        }
        debug!(target: "isolab::session", session = %self.id, "Session closed");
        match self.conn.take() {
            Some(conn) => conn.close(),
            None => Ok(()),
        }
    }

    fn conn_ref(&self) -> Result<&dyn Connection> {
        self.conn
            .as_deref()
            .ok_or_else(|| Error::invalid_state("session is closed"))
    }

    fn conn_mut(&mut self) -> Result<&mut Box<dyn Connection>> {
        self.conn
            .as_mut()
            .ok_or_else(|| Error::invalid_state("session is closed"))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state.is_active() && self.conn.is_some() {
            warn!(target: "isolab::session", session = %self.id, "Dropping session with an active transaction, rolling back");
            self.rollback_quietly();
        }
        if let Some(conn) = self.conn.take() {
            let _ = conn.close();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("requested", &self.requested)
            .field("effective", &self.effective)
            .field("state", &self.state)
            .finish()
    }
}
