//! Built-in scenarios
//!
//! Every scenario has a writer at READ UNCOMMITTED and an observer at the
//! level under test. The writer is pinned to READ UNCOMMITTED so engines
//! whose dirty reads depend on the writer's mode (SQLite shared cache) can
//! still expose them.

use std::time::Duration;
use tracing::debug;

use isolab_core::{AccountId, Capabilities, Error, IsolationLevel, Query, Result, SqlValue};
use isolab_session::SessionFactory;

use crate::assertion::{judge, Verdict};
use crate::result::ScenarioResult;
use crate::scenario::{DirtyReadExpectation, Scenario, ScenarioBuilder, Step};

const WRITER: &str = "writer";
const OBSERVER: &str = "observer";

/// Seed data shared by the built-in scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    /// Account the dirty write targets
    pub account: AccountId,
    /// Committed balance of `account`
    pub baseline: i64,
    /// Second account, used by transfers
    pub other: AccountId,
    /// Committed balance of `other`
    pub other_balance: i64,
    /// Balance the writer sets without committing
    pub uncommitted: i64,
    /// Amount moved by the transfer scenario
    pub amount: i64,
    /// How long the stalled writer sleeps before its barrier
    pub stall: Duration,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            account: AccountId(1),
            baseline: 100,
            other: AccountId(2),
            other_balance: 200,
            uncommitted: 50,
            amount: 30,
            stall: Duration::from_secs(600),
        }
    }
}

impl Fixture {
    /// Committed total across both accounts.
    pub fn total(&self) -> i64 {
        self.baseline + self.other_balance
    }

    /// Replace the account table's contents with the fixture rows.
    ///
    /// Rows are written with explicit ids so the fixture does not depend on
    /// the auto-increment counter.
    ///
    /// # Errors
    ///
    /// Any session or statement error; the seeding transaction is rolled
    /// back.
    pub fn seed(&self, factory: &dyn SessionFactory) -> Result<()> {
        if self.account == self.other {
            return Err(Error::invalid_state("fixture accounts must differ"));
        }
        let mut session = factory.open_named("seed", IsolationLevel::Serializable)?;
        session.begin()?;
        session.execute_sql("DELETE FROM account", &[])?;
        for (id, name, balance) in [
            (self.account, "alice", self.baseline),
            (self.other, "bob", self.other_balance),
        ] {
            session.execute_sql(
                "INSERT INTO account (id, name, balance) VALUES (?, ?, ?)",
                &[SqlValue::Int(id.0), name.into(), SqlValue::Int(balance)],
            )?;
        }
        session.commit()?;
        debug!(target: "isolab::coordinator", account = %self.account, other = %self.other, "Fixture seeded");
        session.close()
    }
}

/// Entry of the built-in catalog.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    /// Scenario name
    pub name: &'static str,
    /// One-line description
    pub summary: &'static str,
    /// True if a `DeadlockOrHang` is the expected result
    pub expects_hang: bool,
    build: fn(&Fixture, IsolationLevel) -> ScenarioBuilder,
}

impl CatalogEntry {
    /// Scenario with the observer at `level`, not yet built.
    pub fn scenario(&self, fixture: &Fixture, level: IsolationLevel) -> ScenarioBuilder {
        (self.build)(fixture, level)
    }

    /// Verdict for one run of this entry.
    ///
    /// Entries that expect a hang pass only on `DeadlockOrHang`; the rest
    /// defer to [`judge`].
    pub fn judge(
        &self,
        scenario: &Scenario,
        run: &Result<ScenarioResult>,
        capabilities: &Capabilities,
    ) -> Verdict {
        if !self.expects_hang {
            return judge(scenario, run, capabilities);
        }
        match run {
            Err(Error::DeadlockOrHang { .. }) => Verdict::Pass { expected: None },
            Err(e) => Verdict::InfrastructureError {
                error: e.to_string(),
            },
            Ok(_) => Verdict::InfrastructureError {
                error: format!("scenario '{}' finished but was expected to hang", self.name),
            },
        }
    }
}

static CATALOG: [CatalogEntry; 4] = [
    CatalogEntry {
        name: "dirty_read_rollback",
        summary: "observer reads a balance the writer later rolls back",
        expects_hang: false,
        build: dirty_read_rollback,
    },
    CatalogEntry {
        name: "dirty_read_commit",
        summary: "observer reads a balance before the writer commits it",
        expects_hang: false,
        build: dirty_read_commit,
    },
    CatalogEntry {
        name: "dirty_total_during_transfer",
        summary: "observer sums balances halfway through a transfer",
        expects_hang: false,
        build: dirty_total_during_transfer,
    },
    CatalogEntry {
        name: "stalled_writer",
        summary: "writer never reaches its barrier; the run must be cut off",
        expects_hang: true,
        build: stalled_writer,
    },
];

/// All catalog entries.
pub fn entries() -> &'static [CatalogEntry] {
    &CATALOG
}

/// Names of all catalog entries.
pub fn names() -> impl Iterator<Item = &'static str> {
    CATALOG.iter().map(|e| e.name)
}

/// Look up an entry.
///
/// # Errors
///
/// `NotFound` for an unknown name.
pub fn by_name(name: &str) -> Result<&'static CatalogEntry> {
    CATALOG
        .iter()
        .find(|e| e.name == name)
        .ok_or_else(|| Error::NotFound {
            what: format!("scenario '{}'", name),
        })
}

/// Writer overwrites a balance and rolls back after the observer read it.
pub fn dirty_read_rollback(fixture: &Fixture, level: IsolationLevel) -> ScenarioBuilder {
    let a = fixture.account;
    ScenarioBuilder::new("dirty_read_rollback")
        .session(
            WRITER,
            IsolationLevel::ReadUncommitted,
            [
                Step::Begin,
                Step::set_balance(a, fixture.uncommitted),
                Step::barrier("written"),
                Step::barrier("observed"),
                Step::Rollback,
                Step::barrier("rolled-back"),
            ],
        )
        .session(
            OBSERVER,
            level,
            [
                Step::barrier("written"),
                Step::BeginReadOnly,
                Step::read_balance("mid", a),
                Step::Commit,
                Step::barrier("observed"),
                Step::barrier("rolled-back"),
                Step::BeginReadOnly,
                Step::read_balance("final", a),
                Step::Commit,
            ],
        )
        .expectation(DirtyReadExpectation {
            observer: OBSERVER.to_string(),
            writer: WRITER.to_string(),
            mid_read: "mid".to_string(),
            final_read: Some("final".to_string()),
            baseline: fixture.baseline,
            uncommitted: fixture.uncommitted,
            final_value: fixture.baseline,
        })
}

/// Writer overwrites a balance and commits after the observer read it.
pub fn dirty_read_commit(fixture: &Fixture, level: IsolationLevel) -> ScenarioBuilder {
    let a = fixture.account;
    ScenarioBuilder::new("dirty_read_commit")
        .session(
            WRITER,
            IsolationLevel::ReadUncommitted,
            [
                Step::Begin,
                Step::set_balance(a, fixture.uncommitted),
                Step::barrier("written"),
                Step::barrier("observed"),
                Step::Commit,
                Step::barrier("done"),
            ],
        )
        .session(
            OBSERVER,
            level,
            [
                Step::barrier("written"),
                Step::BeginReadOnly,
                Step::read_balance("mid", a),
                Step::Commit,
                Step::barrier("observed"),
                Step::barrier("done"),
                Step::BeginReadOnly,
                Step::read_balance("final", a),
                Step::Commit,
            ],
        )
        .expectation(DirtyReadExpectation {
            observer: OBSERVER.to_string(),
            writer: WRITER.to_string(),
            mid_read: "mid".to_string(),
            final_read: Some("final".to_string()),
            baseline: fixture.baseline,
            uncommitted: fixture.uncommitted,
            final_value: fixture.uncommitted,
        })
}

/// Observer sums all balances between the debit and the credit of a
/// transfer. A dirty read sees money missing.
pub fn dirty_total_during_transfer(fixture: &Fixture, level: IsolationLevel) -> ScenarioBuilder {
    let total = fixture.total();
    ScenarioBuilder::new("dirty_total_during_transfer")
        .session(
            WRITER,
            IsolationLevel::ReadUncommitted,
            [
                Step::Begin,
                Step::adjust_balance(fixture.account, -fixture.amount),
                Step::barrier("debited"),
                Step::barrier("observed"),
                Step::adjust_balance(fixture.other, fixture.amount),
                Step::Commit,
                Step::barrier("done"),
            ],
        )
        .session(
            OBSERVER,
            level,
            [
                Step::barrier("debited"),
                Step::BeginReadOnly,
                Step::read("mid-total", Query::TotalBalance),
                Step::Commit,
                Step::barrier("observed"),
                Step::barrier("done"),
                Step::BeginReadOnly,
                Step::read("final-total", Query::TotalBalance),
                Step::Commit,
            ],
        )
        .expectation(DirtyReadExpectation {
            observer: OBSERVER.to_string(),
            writer: WRITER.to_string(),
            mid_read: "mid-total".to_string(),
            final_read: Some("final-total".to_string()),
            baseline: total,
            uncommitted: total - fixture.amount,
            final_value: total,
        })
}

/// Writer holds an uncommitted write and stalls before its barrier.
pub fn stalled_writer(fixture: &Fixture, level: IsolationLevel) -> ScenarioBuilder {
    let a = fixture.account;
    ScenarioBuilder::new("stalled_writer")
        .session(
            WRITER,
            IsolationLevel::ReadUncommitted,
            [
                Step::Begin,
                Step::set_balance(a, fixture.uncommitted),
                Step::Pause(fixture.stall),
                Step::barrier("written"),
                Step::Rollback,
            ],
        )
        .session(
            OBSERVER,
            level,
            [
                Step::barrier("written"),
                Step::BeginReadOnly,
                Step::read_balance("mid", a),
                Step::Commit,
            ],
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_entry_builds_at_every_level() {
        let fixture = Fixture::default();
        for entry in entries() {
            for level in IsolationLevel::ALL {
                let scenario = entry.scenario(&fixture, level).build().unwrap();
                assert_eq!(scenario.name(), entry.name);
                assert_eq!(scenario.session(OBSERVER).unwrap().level, level);
                assert_eq!(
                    scenario.session(WRITER).unwrap().level,
                    IsolationLevel::ReadUncommitted
                );
            }
        }
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(names().count(), 4);
        assert!(by_name("stalled_writer").unwrap().expects_hang);
        assert!(!by_name("dirty_read_rollback").unwrap().expects_hang);
        assert!(matches!(by_name("phantom"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn transfer_expectation_tracks_missing_amount() {
        let fixture = Fixture::default();
        let scenario = dirty_total_during_transfer(&fixture, IsolationLevel::ReadUncommitted)
            .build()
            .unwrap();
        let expectation = scenario.expectation().unwrap();
        assert_eq!(expectation.baseline, 300);
        assert_eq!(expectation.uncommitted, 270);
        assert_eq!(expectation.final_value, 300);
    }

    #[test]
    fn stalled_writer_has_no_expectation() {
        let scenario = stalled_writer(&Fixture::default(), IsolationLevel::ReadCommitted)
            .build()
            .unwrap();
        assert!(scenario.expectation().is_none());
        assert_eq!(scenario.barriers().get("written"), Some(&2));
    }

    #[test]
    fn hang_entries_pass_only_on_hang() {
        let entry = by_name("stalled_writer").unwrap();
        let scenario = entry
            .scenario(&Fixture::default(), IsolationLevel::Serializable)
            .build()
            .unwrap();
        let caps = isolab_core::Engine::Sqlite.capabilities();
        let hang = Err(Error::DeadlockOrHang {
            scenario: entry.name.to_string(),
            cause: isolab_core::HangCause::Deadline {
                deadline: Duration::from_secs(1),
            },
            unresponsive: Vec::new(),
        });
        assert!(entry.judge(&scenario, &hang, caps).is_pass());
        let refused = Err(Error::Connection {
            reason: "refused".to_string(),
        });
        assert!(!entry.judge(&scenario, &refused, caps).is_pass());
    }
}
