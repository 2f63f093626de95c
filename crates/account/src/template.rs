//! Declarative transaction boundaries
//!
//! A [`TransactionTemplate`] carries the isolation level, read-only flag and
//! retry budget of a unit of work. [`TransactionTemplate::execute`] opens a
//! session, runs the callback inside one transaction and commits, unless the
//! callback failed or marked the scope rollback-only. A transaction that
//! loses a lock conflict is rolled back and run again from the start while
//! attempts remain.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use isolab_core::{IsolationLevel, Query, Result, SqlValue, Write, WriteOutcome};
use isolab_session::{Row, Session, SessionFactory};

/// Transaction attributes plus the factory to open sessions from.
#[derive(Clone)]
pub struct TransactionTemplate {
    factory: Arc<dyn SessionFactory>,
    level: IsolationLevel,
    read_only: bool,
    max_attempts: u32,
    backoff: Duration,
}

impl TransactionTemplate {
    /// Read-write template at `level`, run once.
    pub fn new(factory: Arc<dyn SessionFactory>, level: IsolationLevel) -> Self {
        Self {
            factory,
            level,
            read_only: false,
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Same template, run up to `max_attempts` times while the transaction
    /// keeps losing lock conflicts. The pause before attempt `n + 1` is
    /// `n * backoff`.
    pub fn retrying(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Same template with the read-only flag set to `read_only`.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Isolation level
    pub fn level(&self) -> IsolationLevel {
        self.level
    }

    /// Read-only flag
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Attempts allowed per unit of work
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `work` in one transaction on a fresh session named `name`.
    ///
    /// `work` runs again, in a new transaction on a new session, after each
    /// lock conflict until the attempts run out.
    ///
    /// # Errors
    ///
    /// Errors from opening the session, from `work`, or from the commit; the
    /// last `Conflict` once every attempt lost one. The transaction is rolled
    /// back on any error.
    pub fn execute<T, F>(&self, name: &str, mut work: F) -> Result<T>
    where
        F: FnMut(&mut TransactionScope<'_>) -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            match self.attempt(name, &mut work) {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    debug!(target: "isolab::account", name, attempt, error = %e, "Lock conflict, retrying");
                    thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                Err(e) if e.is_retryable() && self.max_attempts > 1 => {
                    warn!(target: "isolab::account", name, attempts = attempt, error = %e, "Lock conflict on every attempt");
                    return Err(e);
                }
                Ok(value) if attempt > 1 => {
                    info!(target: "isolab::account", name, attempts = attempt, "Committed after retrying");
                    return Ok(value);
                }
                outcome => return outcome,
            }
        }
    }

    fn attempt<T, F>(&self, name: &str, work: &mut F) -> Result<T>
    where
        F: FnMut(&mut TransactionScope<'_>) -> Result<T>,
    {
        let mut session = self.factory.open_named(name, self.level)?;
        if self.read_only {
            session.begin_read_only()?;
        } else {
            session.begin()?;
        }

        let mut scope = TransactionScope {
            session: &mut session,
            rollback_only: false,
        };
        let outcome = work(&mut scope);
        let rollback_only = scope.rollback_only;

        let finished = match &outcome {
            Ok(_) if !rollback_only => session.commit(),
            Ok(_) => {
                debug!(target: "isolab::account", name, "Rollback-only transaction rolled back");
                session.rollback()
            }
            Err(e) => {
                warn!(target: "isolab::account", name, error = %e, "Unit of work failed, rolling back");
                session.rollback()
            }
        };
        let closed = session.close();
        let value = outcome?;
        finished?;
        closed?;
        Ok(value)
    }
}

/// Handle on the transaction a template opened.
pub struct TransactionScope<'a> {
    session: &'a mut Session,
    rollback_only: bool,
}

impl TransactionScope<'_> {
    /// Underlying session.
    pub fn session(&mut self) -> &mut Session {
        self.session
    }

    /// Roll the transaction back instead of committing it.
    pub fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    /// Check the rollback-only marker
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// Run a write.
    pub fn write(&mut self, write: &Write) -> Result<WriteOutcome> {
        self.session.write(write)
    }

    /// Run a single-value read.
    pub fn read(&mut self, query: &Query) -> Result<Option<i64>> {
        self.session.read(query)
    }

    /// Run a parameterized query.
    pub fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.session.query_sql(sql, params)
    }
}
