//! Statements a scenario step can issue
//!
//! Scenarios only touch the `account` table, so statements are a closed set
//! rather than free-form SQL. Each one renders to `?`-placeholder SQL that both
//! supported engines accept.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary key of an account row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Engine-neutral column or parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// Integer
    Int(i64),
    /// Floating point
    Real(f64),
    /// Text
    Text(String),
}

impl SqlValue {
    /// Integer view of the value. Text holding an integer is accepted since
    /// some drivers return aggregates as strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text view of the value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Check for SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

/// A write against the account table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "op")]
pub enum Write {
    /// Overwrite an account's balance
    SetBalance {
        /// Target account
        account: AccountId,
        /// New balance
        balance: i64,
    },
    /// Add `delta` (possibly negative) to an account's balance
    AdjustBalance {
        /// Target account
        account: AccountId,
        /// Amount to add
        delta: i64,
    },
    /// Insert a new account
    Insert {
        /// Account holder
        name: String,
        /// Opening balance
        balance: i64,
    },
}

impl Write {
    /// SQL text with `?` placeholders.
    pub fn sql(&self) -> &'static str {
        match self {
            Write::SetBalance { .. } => "UPDATE account SET balance = ? WHERE id = ?",
            Write::AdjustBalance { .. } => "UPDATE account SET balance = balance + ? WHERE id = ?",
            Write::Insert { .. } => "INSERT INTO account (name, balance) VALUES (?, ?)",
        }
    }

    /// Positional parameters matching [`Write::sql`].
    pub fn params(&self) -> Vec<SqlValue> {
        match self {
            Write::SetBalance { account, balance } => {
                vec![SqlValue::Int(*balance), SqlValue::Int(account.0)]
            }
            Write::AdjustBalance { account, delta } => {
                vec![SqlValue::Int(*delta), SqlValue::Int(account.0)]
            }
            Write::Insert { name, balance } => {
                vec![SqlValue::Text(name.clone()), SqlValue::Int(*balance)]
            }
        }
    }
}

impl fmt::Display for Write {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Write::SetBalance { account, balance } => {
                write!(f, "set balance of {} to {}", account, balance)
            }
            Write::AdjustBalance { account, delta } => {
                write!(f, "adjust balance of {} by {:+}", account, delta)
            }
            Write::Insert { name, balance } => {
                write!(f, "insert account '{}' with {}", name, balance)
            }
        }
    }
}

/// A single-value read against the account table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "op", content = "account")]
pub enum Query {
    /// Balance of one account
    Balance(AccountId),
    /// Balance of one account, locking the row against other writers until
    /// the transaction ends
    BalanceForUpdate(AccountId),
    /// Sum of every balance
    TotalBalance,
    /// Number of accounts
    AccountCount,
}

impl Query {
    /// SQL text with `?` placeholders. Locking reads are plain `SELECT`s
    /// here; the connection adds the engine's locking clause.
    pub fn sql(&self) -> &'static str {
        match self {
            Query::Balance(_) | Query::BalanceForUpdate(_) => {
                "SELECT balance FROM account WHERE id = ?"
            }
            Query::TotalBalance => "SELECT SUM(balance) FROM account",
            Query::AccountCount => "SELECT COUNT(*) FROM account",
        }
    }

    /// Positional parameters matching [`Query::sql`].
    pub fn params(&self) -> Vec<SqlValue> {
        match self {
            Query::Balance(id) | Query::BalanceForUpdate(id) => vec![SqlValue::Int(id.0)],
            Query::TotalBalance | Query::AccountCount => Vec::new(),
        }
    }

    /// Whether the read locks what it returns.
    pub fn is_locking(&self) -> bool {
        matches!(self, Query::BalanceForUpdate(_))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Balance(id) => write!(f, "balance of {}", id),
            Query::BalanceForUpdate(id) => write!(f, "balance of {} for update", id),
            Query::TotalBalance => f.write_str("total balance"),
            Query::AccountCount => f.write_str("account count"),
        }
    }
}

/// Outcome of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteOutcome {
    /// Rows changed by the statement
    pub rows_affected: u64,
    /// Generated key, for inserts
    pub last_insert_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_params_follow_placeholder_order() {
        let w = Write::SetBalance {
            account: AccountId(1),
            balance: 50,
        };
        assert_eq!(w.sql().matches('?').count(), w.params().len());
        assert_eq!(w.params(), vec![SqlValue::Int(50), SqlValue::Int(1)]);

        let w = Write::Insert {
            name: "Alice".to_string(),
            balance: 1000,
        };
        assert_eq!(w.params()[0], SqlValue::Text("Alice".to_string()));
    }

    #[test]
    fn query_params_match_placeholders() {
        for q in [
            Query::Balance(AccountId(9)),
            Query::BalanceForUpdate(AccountId(9)),
            Query::TotalBalance,
            Query::AccountCount,
        ] {
            assert_eq!(q.sql().matches('?').count(), q.params().len(), "{q}");
        }
    }

    #[test]
    fn only_for_update_reads_lock() {
        assert!(Query::BalanceForUpdate(AccountId(1)).is_locking());
        assert!(!Query::Balance(AccountId(1)).is_locking());
        assert!(!Query::TotalBalance.is_locking());
    }

    #[test]
    fn sql_value_integer_views() {
        assert_eq!(SqlValue::Int(7).as_i64(), Some(7));
        assert_eq!(SqlValue::Text(" 3000 ".to_string()).as_i64(), Some(3000));
        assert_eq!(SqlValue::Real(12.0).as_i64(), Some(12));
        assert_eq!(SqlValue::Real(1.5).as_i64(), None);
        assert_eq!(SqlValue::Null.as_i64(), None);
    }

    #[test]
    fn adjust_display_shows_sign() {
        let w = Write::AdjustBalance {
            account: AccountId(2),
            delta: -25,
        };
        assert_eq!(w.to_string(), "adjust balance of #2 by -25");
    }
}
