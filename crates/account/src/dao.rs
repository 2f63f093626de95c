//! Account data access on raw sessions
//!
//! Every call opens its own session at the DAO's level, begins a transaction
//! (read-only for queries), commits, and rolls back on error.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use isolab_core::{AccountId, Error, IsolationLevel, Query, Result, SqlValue, Write};
use isolab_session::{Session, SessionFactory};

use crate::model::{Account, Page};

/// Accounts, balances and transfers at one fixed isolation level.
#[derive(Clone)]
pub struct AccountDao {
    factory: Arc<dyn SessionFactory>,
    level: IsolationLevel,
}

impl AccountDao {
    /// DAO running every call at `level`.
    pub fn new(factory: Arc<dyn SessionFactory>, level: IsolationLevel) -> Self {
        Self { factory, level }
    }

    /// Level every call runs at
    pub fn level(&self) -> IsolationLevel {
        self.level
    }

    /// Insert an account and return its id.
    pub fn create_account(&self, name: &str, balance: i64) -> Result<AccountId> {
        self.in_transaction("create_account", false, |session| {
            let outcome = session.write(&Write::Insert {
                name: name.to_string(),
                balance,
            })?;
            let id = outcome
                .last_insert_id
                .map(AccountId)
                .ok_or_else(|| Error::statement("insert returned no generated key"))?;
            debug!(target: "isolab::account", %id, name, balance, "Account created");
            Ok(id)
        })
    }

    /// Balance of `account`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the account does not exist.
    pub fn balance(&self, account: AccountId) -> Result<i64> {
        self.in_transaction("balance", true, |session| {
            session
                .read(&Query::Balance(account))?
                .ok_or_else(|| Error::NotFound {
                    what: format!("account {}", account),
                })
        })
    }

    /// Move `amount` from one account to another in one transaction.
    ///
    /// # Errors
    ///
    /// `NotFound` if either account does not exist; nothing is moved.
    pub fn move_amount(&self, from: AccountId, to: AccountId, amount: i64) -> Result<()> {
        self.transfer(from, to, amount, Duration::ZERO)
    }

    /// [`AccountDao::move_amount`] with the debit left uncommitted for `hold`
    /// before the credit.
    pub(crate) fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: i64,
        hold: Duration,
    ) -> Result<()> {
        self.in_transaction("move_amount", false, |session| {
            for (account, delta) in [(from, -amount), (to, amount)] {
                let outcome = session.write(&Write::AdjustBalance { account, delta })?;
                if outcome.rows_affected == 0 {
                    return Err(Error::NotFound {
                        what: format!("account {}", account),
                    });
                }
                if delta < 0 && !hold.is_zero() {
                    thread::sleep(hold);
                }
            }
            Ok(())
        })
    }

    /// Sum of all balances; zero for an empty table.
    pub fn total_balances(&self) -> Result<i64> {
        self.in_transaction("total_balances", true, |session| {
            Ok(session.read(&Query::TotalBalance)?.unwrap_or(0))
        })
    }

    /// Page `page` (zero-based) of `page_size` accounts by id, with the total
    /// count read in the same transaction.
    pub fn accounts(&self, page: u64, page_size: u64) -> Result<Page<Account>> {
        let limit = i64::try_from(page_size)
            .map_err(|_| Error::invalid_state(format!("page size {} too large", page_size)))?;
        let offset = page
            .checked_mul(page_size)
            .and_then(|o| i64::try_from(o).ok())
            .ok_or_else(|| Error::invalid_state(format!("page {} out of range", page)))?;

        self.in_transaction("accounts", true, |session| {
            let items = session
                .query_sql(
                    "SELECT id, name, balance FROM account ORDER BY id LIMIT ? OFFSET ?",
                    &[SqlValue::Int(limit), SqlValue::Int(offset)],
                )?
                .iter()
                .map(|row| Account::from_row(row))
                .collect::<Result<Vec<_>>>()?;
            let total = session.read(&Query::AccountCount)?.unwrap_or(0);
            Ok(Page {
                items,
                total: u64::try_from(total).unwrap_or(0),
            })
        })
    }

    fn in_transaction<T>(
        &self,
        op: &str,
        read_only: bool,
        work: impl FnOnce(&mut Session) -> Result<T>,
    ) -> Result<T> {
        let mut session = self.factory.open_named(op, self.level)?;
        let outcome = if read_only {
            session.begin_read_only()
        } else {
            session.begin()
        }
        .and_then(|()| work(&mut session))
        .and_then(|value| session.commit().map(|()| value));

        if let Err(e) = &outcome {
            warn!(target: "isolab::account", op, level = %self.level, error = %e, "Account operation failed");
            if session.state().is_active() {
                if let Err(rb) = session.rollback() {
                    warn!(target: "isolab::account", op, error = %rb, "Rollback failed");
                }
            }
        }
        session.close()?;
        outcome
    }
}
