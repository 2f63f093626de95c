//! Engine seam
//!
//! Each backend implements [`Connection`] over its driver. The trait is
//! deliberately small: no pooling, no statement cache, no type mapping beyond
//! [`SqlValue`].

use std::fmt;
use std::sync::Arc;

use isolab_core::{Engine, IsolationLevel, Result, SqlValue, WriteOutcome};

/// One result row.
pub type Row = Vec<SqlValue>;

/// A physical connection with autocommit disabled.
///
/// Implementations map driver errors to [`isolab_core::Error`] and never
/// start transactions on their own.
pub trait Connection: Send {
    /// Engine behind the connection.
    fn engine(&self) -> Engine;

    /// Issue the engine directive for `level`. Called with no transaction open.
    fn apply_isolation(&mut self, level: IsolationLevel) -> Result<()>;

    /// Start a transaction.
    fn begin(&mut self, read_only: bool) -> Result<()>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<()>;

    /// Run one parameterized write.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<WriteOutcome>;

    /// Run one parameterized query and collect every row.
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Run a plain `SELECT` so that the rows it returns stay locked against
    /// other writers until the transaction ends. The connection adds whatever
    /// the engine needs for that.
    fn query_for_update(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Run several `;`-separated statements without parameters.
    fn execute_batch(&mut self, sql: &str) -> Result<()>;

    /// Handle that aborts an in-flight statement from another thread.
    fn interrupt_handle(&self) -> InterruptHandle;

    /// Release the physical connection.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Aborts the statement currently running on a connection.
pub trait Interrupt: Send + Sync {
    /// Request the abort. Safe to call when nothing is running.
    fn interrupt(&self);
}

/// Cloneable, thread-safe interrupt handle.
#[derive(Clone)]
pub struct InterruptHandle(Arc<dyn Interrupt>);

impl InterruptHandle {
    /// Wrap an engine interrupt.
    pub fn new(inner: impl Interrupt + 'static) -> Self {
        Self(Arc::new(inner))
    }

    /// Abort the in-flight statement, if any.
    pub fn interrupt(&self) {
        self.0.interrupt()
    }
}

impl fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InterruptHandle")
    }
}
