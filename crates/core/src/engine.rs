//! Engine capability table
//!
//! Engines disagree about what an isolation level actually does. Some expose
//! uncommitted rows under READ UNCOMMITTED, some quietly run a stronger level,
//! some block plain reads behind uncommitted writers. The harness never
//! hardcodes one engine's behavior: expectations are derived from the table
//! below, so adding a backend means adding a row.
//!
//! | Engine | RU | RC | RR | S |
//! |--------|----|----|----|---|
//! | SQLite | native (shared cache) | strengthened to S | strengthened to S | native |
//! | MySQL (InnoDB) | native | native | native | native, reads lock |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::isolation::IsolationLevel;

/// Relational engine behind a session factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// SQLite through the bundled library
    Sqlite,
    /// MySQL with the InnoDB storage engine
    #[serde(rename = "mysql")]
    MySql,
}

impl Engine {
    /// Lowercase name used in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Engine::Sqlite => "sqlite",
            Engine::MySql => "mysql",
        }
    }

    /// Capability row for this engine.
    pub fn capabilities(&self) -> &'static Capabilities {
        Capabilities::for_engine(*self)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Engine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Engine::Sqlite),
            "mysql" | "innodb" => Ok(Engine::MySql),
            other => Err(Error::Config {
                reason: format!("unknown engine '{}', expected \"sqlite\" or \"mysql\"", other),
            }),
        }
    }
}

/// How an engine honors a requested isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "runs-as")]
pub enum Support {
    /// The engine implements the level as specified
    Native,
    /// The engine runs a stronger level instead (never a weaker one)
    Strengthened(IsolationLevel),
    /// The engine cannot honor the level
    Unsupported,
}

/// Whether READ UNCOMMITTED actually exposes uncommitted rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DirtyReads {
    /// Uncommitted rows are never visible to other sessions
    Never,
    /// Visible only when the writer is itself a READ UNCOMMITTED session
    /// (SQLite: only shared-cache connections see each other's pages)
    ReadUncommittedWriters,
    /// Visible regardless of the writer's level
    AnyWriter,
}

/// Capability row for one engine.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    /// Engine this row describes
    pub engine: Engine,
    /// Support for each level, weakest first
    pub levels: [(IsolationLevel, Support); 4],
    /// Dirty-read exposure under READ UNCOMMITTED
    pub dirty_reads: DirtyReads,
    /// Levels (as run by the engine) where a plain read waits for
    /// uncommitted writers instead of reading a snapshot
    pub blocking_reads: &'static [IsolationLevel],
}

static SQLITE: Capabilities = Capabilities {
    engine: Engine::Sqlite,
    levels: [
        (IsolationLevel::ReadUncommitted, Support::Native),
        (
            IsolationLevel::ReadCommitted,
            Support::Strengthened(IsolationLevel::Serializable),
        ),
        (
            IsolationLevel::RepeatableRead,
            Support::Strengthened(IsolationLevel::Serializable),
        ),
        (IsolationLevel::Serializable, Support::Native),
    ],
    dirty_reads: DirtyReads::ReadUncommittedWriters,
    blocking_reads: &[],
};

static MYSQL: Capabilities = Capabilities {
    engine: Engine::MySql,
    levels: [
        (IsolationLevel::ReadUncommitted, Support::Native),
        (IsolationLevel::ReadCommitted, Support::Native),
        (IsolationLevel::RepeatableRead, Support::Native),
        (IsolationLevel::Serializable, Support::Native),
    ],
    dirty_reads: DirtyReads::AnyWriter,
    // InnoDB turns plain SELECTs into locking reads under SERIALIZABLE.
    blocking_reads: &[IsolationLevel::Serializable],
};

impl Capabilities {
    /// Capability row for an engine.
    pub fn for_engine(engine: Engine) -> &'static Capabilities {
        match engine {
            Engine::Sqlite => &SQLITE,
            Engine::MySql => &MYSQL,
        }
    }

    /// How `level` is honored.
    pub fn support(&self, level: IsolationLevel) -> Support {
        self.levels
            .iter()
            .find(|(l, _)| *l == level)
            .map(|(_, s)| *s)
            .unwrap_or(Support::Unsupported)
    }

    /// Level the engine really runs when `level` is requested, if any.
    pub fn effective_level(&self, level: IsolationLevel) -> Option<IsolationLevel> {
        match self.support(level) {
            Support::Native => Some(level),
            Support::Strengthened(actual) => Some(actual),
            Support::Unsupported => None,
        }
    }

    /// Levels that open without error (natively or strengthened).
    pub fn supported_levels(&self) -> impl Iterator<Item = IsolationLevel> + '_ {
        self.levels
            .iter()
            .filter(|(_, s)| *s != Support::Unsupported)
            .map(|(l, _)| *l)
    }

    /// Whether a reader at `observer` sees rows written, but not yet
    /// committed, by a writer at `writer`.
    pub fn exposes_dirty_read(&self, observer: IsolationLevel, writer: IsolationLevel) -> bool {
        if self.effective_level(observer) != Some(IsolationLevel::ReadUncommitted) {
            return false;
        }
        match self.dirty_reads {
            DirtyReads::Never => false,
            DirtyReads::ReadUncommittedWriters => writer == IsolationLevel::ReadUncommitted,
            DirtyReads::AnyWriter => true,
        }
    }

    /// Whether a plain read at `observer` waits behind uncommitted writers.
    pub fn reads_block_on_writers(&self, observer: IsolationLevel) -> bool {
        self.effective_level(observer)
            .map(|l| self.blocking_reads.contains(&l))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_level_has_an_entry_for_every_engine() {
        for engine in [Engine::Sqlite, Engine::MySql] {
            let caps = engine.capabilities();
            for level in IsolationLevel::ALL {
                assert_ne!(
                    caps.support(level),
                    Support::Unsupported,
                    "{engine} should map {level}"
                );
            }
        }
    }

    #[test]
    fn strengthened_levels_are_never_weaker() {
        for engine in [Engine::Sqlite, Engine::MySql] {
            let caps = engine.capabilities();
            for level in IsolationLevel::ALL {
                let effective = caps.effective_level(level).unwrap();
                assert!(effective >= level, "{engine}: {level} runs as {effective}");
            }
        }
    }

    #[test]
    fn sqlite_dirty_reads_need_an_uncommitted_writer() {
        let caps = Engine::Sqlite.capabilities();
        assert!(caps.exposes_dirty_read(
            IsolationLevel::ReadUncommitted,
            IsolationLevel::ReadUncommitted
        ));
        assert!(!caps.exposes_dirty_read(
            IsolationLevel::ReadUncommitted,
            IsolationLevel::ReadCommitted
        ));
        assert!(!caps.exposes_dirty_read(
            IsolationLevel::ReadCommitted,
            IsolationLevel::ReadUncommitted
        ));
    }

    #[test]
    fn mysql_dirty_reads_from_any_writer() {
        let caps = Engine::MySql.capabilities();
        assert!(caps.exposes_dirty_read(
            IsolationLevel::ReadUncommitted,
            IsolationLevel::Serializable
        ));
        assert!(!caps.exposes_dirty_read(
            IsolationLevel::RepeatableRead,
            IsolationLevel::ReadUncommitted
        ));
    }

    #[test]
    fn only_innodb_serializable_reads_block() {
        assert!(Engine::MySql
            .capabilities()
            .reads_block_on_writers(IsolationLevel::Serializable));
        assert!(!Engine::MySql
            .capabilities()
            .reads_block_on_writers(IsolationLevel::ReadCommitted));
        for level in IsolationLevel::ALL {
            assert!(!Engine::Sqlite.capabilities().reads_block_on_writers(level));
        }
    }

    #[test]
    fn engine_parse() {
        assert_eq!("SQLite".parse::<Engine>().unwrap(), Engine::Sqlite);
        assert_eq!("innodb".parse::<Engine>().unwrap(), Engine::MySql);
        assert!(matches!(
            "oracle".parse::<Engine>(),
            Err(Error::Config { .. })
        ));
    }
}
