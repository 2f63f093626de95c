//! Embedded migration scripts

use isolab_core::Engine;

/// One versioned migration script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    /// Version, starting at 1 and strictly increasing
    pub version: u32,
    /// Short description
    pub description: &'static str,
    /// Script; statements separated by `;`
    pub sql: &'static str,
}

impl Migration {
    /// CRC32 of the script text.
    pub fn checksum(&self) -> u32 {
        crc32fast::hash(self.sql.as_bytes())
    }
}

const SQLITE: &[Migration] = &[
    Migration {
        version: 1,
        description: "create account",
        sql: include_str!("../migrations/sqlite/V1__create_account.sql"),
    },
    Migration {
        version: 2,
        description: "index account name",
        sql: include_str!("../migrations/sqlite/V2__index_account_name.sql"),
    },
];

const MYSQL: &[Migration] = &[
    Migration {
        version: 1,
        description: "create account",
        sql: include_str!("../migrations/mysql/V1__create_account.sql"),
    },
    Migration {
        version: 2,
        description: "index account name",
        sql: include_str!("../migrations/mysql/V2__index_account_name.sql"),
    },
];

/// Migrations for `engine`, in version order.
pub fn migrations_for(engine: Engine) -> &'static [Migration] {
    match engine {
        Engine::Sqlite => SQLITE,
        Engine::MySql => MYSQL,
    }
}
