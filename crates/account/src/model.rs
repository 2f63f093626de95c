//! Account rows and pages

use serde::Serialize;

use isolab_core::{AccountId, Error, Result, SqlValue};

/// One row of the account table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    /// Primary key
    pub id: AccountId,
    /// Account holder
    pub name: String,
    /// Balance in minor units
    pub balance: i64,
}

impl Account {
    /// Decode an `id, name, balance` row.
    pub(crate) fn from_row(row: &[SqlValue]) -> Result<Self> {
        match row {
            [id, name, balance] => {
                let malformed = || Error::statement(format!("malformed account row: {:?}", row));
                Ok(Account {
                    id: AccountId(id.as_i64().ok_or_else(malformed)?),
                    name: name.as_str().ok_or_else(malformed)?.to_string(),
                    balance: balance.as_i64().ok_or_else(malformed)?,
                })
            }
            _ => Err(Error::statement(format!(
                "account row has {} columns, expected 3",
                row.len()
            ))),
        }
    }
}

/// A page of items plus the total item count at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Count of all items, read in the same transaction as `items`
    pub total: u64,
}

impl<T> Page<T> {
    /// Number of items on this page
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check for an empty page
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
