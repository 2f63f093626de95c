//! Account repository with per-method transaction attributes

use std::sync::Arc;
use std::time::Duration;

use isolab_core::{AccountId, Error, IsolationLevel, Query, Result, Write};
use isolab_session::SessionFactory;

use crate::template::{TransactionScope, TransactionTemplate};

/// Account operations whose isolation level is part of their contract.
///
/// | method | level | read-only |
/// |--------|-------|-----------|
/// | `create_account` | READ UNCOMMITTED | no |
/// | `balance` | READ UNCOMMITTED | yes |
/// | `balance_committed` | READ COMMITTED | yes |
/// | `move_amount` | READ UNCOMMITTED | no |
/// | `move_amount_serializable_unlocked` | SERIALIZABLE | no |
/// | `move_amount_serializable_locking` | SERIALIZABLE | no |
/// | `move_amount_serializable_retrying` | SERIALIZABLE, up to 100 attempts | no |
/// | `total_balances` | READ UNCOMMITTED | yes |
/// | `total_balances_committed` | READ COMMITTED | yes |
///
/// The serializable transfers read each balance and write back a computed
/// value, so two concurrent transfers on the same accounts conflict. Only the
/// locking variant avoids the conflict; the others surface it as
/// [`Error::Conflict`] or absorb it by running again.
#[derive(Clone)]
pub struct AccountRepository {
    factory: Arc<dyn SessionFactory>,
}

impl AccountRepository {
    /// Repository opening sessions through `factory`.
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self { factory }
    }

    fn writing(&self, level: IsolationLevel) -> TransactionTemplate {
        TransactionTemplate::new(self.factory.clone(), level)
    }

    fn reading(&self, level: IsolationLevel) -> TransactionTemplate {
        self.writing(level).read_only(true)
    }

    /// Insert an account and return its id.
    pub fn create_account(&self, name: &str, balance: i64) -> Result<AccountId> {
        self.writing(IsolationLevel::ReadUncommitted)
            .execute("create_account", |tx| {
                tx.write(&Write::Insert {
                    name: name.to_string(),
                    balance,
                })?
                .last_insert_id
                .map(AccountId)
                .ok_or_else(|| Error::statement("insert returned no generated key"))
            })
    }

    /// Balance of `account`, uncommitted writes included.
    pub fn balance(&self, account: AccountId) -> Result<i64> {
        self.balance_at(IsolationLevel::ReadUncommitted, account)
    }

    /// Committed balance of `account`.
    pub fn balance_committed(&self, account: AccountId) -> Result<i64> {
        self.balance_at(IsolationLevel::ReadCommitted, account)
    }

    fn balance_at(&self, level: IsolationLevel, account: AccountId) -> Result<i64> {
        self.reading(level).execute("balance", |tx| {
            tx.read(&Query::Balance(account))?
                .ok_or_else(|| Error::NotFound {
                    what: format!("account {}", account),
                })
        })
    }

    /// Move `amount` between two accounts.
    pub fn move_amount(&self, from: AccountId, to: AccountId, amount: i64) -> Result<()> {
        self.writing(IsolationLevel::ReadUncommitted)
            .execute("move_amount", |tx| {
                for (account, delta) in [(from, -amount), (to, amount)] {
                    if tx.write(&Write::AdjustBalance { account, delta })?.rows_affected == 0 {
                        return Err(Error::NotFound {
                            what: format!("account {}", account),
                        });
                    }
                }
                Ok(())
            })
    }

    /// Read-then-write transfer at SERIALIZABLE without locking reads.
    ///
    /// # Errors
    ///
    /// `Conflict` when a concurrent transfer holds or has changed one of the
    /// rows (a deadlock on InnoDB, a busy snapshot on SQLite); nothing is
    /// moved.
    pub fn move_amount_serializable_unlocked(
        &self,
        from: AccountId,
        to: AccountId,
        amount: i64,
    ) -> Result<()> {
        self.writing(IsolationLevel::Serializable)
            .execute("move_amount_serializable_unlocked", |tx| {
                read_then_write(tx, from, to, amount, false)
            })
    }

    /// Read-then-write transfer at SERIALIZABLE that locks both rows as it
    /// reads them, lower id first, so concurrent transfers queue instead of
    /// deadlocking.
    pub fn move_amount_serializable_locking(
        &self,
        from: AccountId,
        to: AccountId,
        amount: i64,
    ) -> Result<()> {
        let (first, second, delta) = if from <= to {
            (from, to, amount)
        } else {
            (to, from, -amount)
        };
        self.writing(IsolationLevel::Serializable)
            .execute("move_amount_serializable_locking", |tx| {
                read_then_write(tx, first, second, delta, true)
            })
    }

    /// The unlocked transfer, run again after every lock conflict.
    pub fn move_amount_serializable_retrying(
        &self,
        from: AccountId,
        to: AccountId,
        amount: i64,
    ) -> Result<()> {
        self.writing(IsolationLevel::Serializable)
            .retrying(SERIALIZABLE_ATTEMPTS, SERIALIZABLE_BACKOFF)
            .execute("move_amount_serializable_retrying", |tx| {
                read_then_write(tx, from, to, amount, false)
            })
    }

    /// Sum of all balances, uncommitted writes included.
    pub fn total_balances(&self) -> Result<i64> {
        self.total_at(IsolationLevel::ReadUncommitted)
    }

    /// Sum of all committed balances.
    pub fn total_balances_committed(&self) -> Result<i64> {
        self.total_at(IsolationLevel::ReadCommitted)
    }

    fn total_at(&self, level: IsolationLevel) -> Result<i64> {
        self.reading(level)
            .execute("total_balances", |tx| Ok(tx.read(&Query::TotalBalance)?.unwrap_or(0)))
    }
}

const SERIALIZABLE_ATTEMPTS: u32 = 100;
const SERIALIZABLE_BACKOFF: Duration = Duration::from_millis(1);

fn read_then_write(
    tx: &mut TransactionScope<'_>,
    from: AccountId,
    to: AccountId,
    amount: i64,
    locking: bool,
) -> Result<()> {
    for (account, delta) in [(from, -amount), (to, amount)] {
        let query = if locking {
            Query::BalanceForUpdate(account)
        } else {
            Query::Balance(account)
        };
        let balance = tx.read(&query)?.ok_or_else(|| Error::NotFound {
            what: format!("account {}", account),
        })?;
        tx.write(&Write::SetBalance {
            account,
            balance: balance + delta,
        })?;
    }
    Ok(())
}
