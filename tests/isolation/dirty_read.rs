//! Dirty Read Tests
//!
//! A READ UNCOMMITTED observer reads between another session's uncommitted
//! write and its rollback or commit.

use crate::common::*;
use isolab::{assert_dirty_read_visible, judge, ExpectedOutcome, SessionStatus, TransactionState};

// ============================================================================
// Rollback
// ============================================================================

#[test]
fn uncommitted_write_is_visible_then_gone() {
    let db = TestDb::new();
    let scenario = catalog::dirty_read_rollback(&db.fixture, IsolationLevel::ReadUncommitted)
        .build()
        .unwrap();

    let result = db.coordinator().run(&scenario).unwrap();

    assert_eq!(result.value("mid"), Some(50));
    assert_eq!(result.value("final"), Some(100));
    assert_dirty_read_visible(&result, IsolationLevel::ReadUncommitted).unwrap();
}

#[test]
fn writer_ends_rolled_back() {
    let db = TestDb::new();
    let scenario = catalog::dirty_read_rollback(&db.fixture, IsolationLevel::ReadUncommitted)
        .build()
        .unwrap();

    let result = db.coordinator().run(&scenario).unwrap();

    let writer = result.session("writer").unwrap();
    assert_eq!(writer.status, SessionStatus::Completed);
    assert_eq!(writer.final_state, TransactionState::RolledBack);
    assert_eq!(db.committed_balance(db.fixture.account), Some(100));
}

#[test]
fn verdict_is_dirty_visible_pass() {
    let db = TestDb::new();
    let scenario = catalog::dirty_read_rollback(&db.fixture, IsolationLevel::ReadUncommitted)
        .build()
        .unwrap();

    let run = db.coordinator().run(&scenario);

    assert_eq!(
        judge(&scenario, &run, Engine::Sqlite.capabilities()),
        Verdict::Pass {
            expected: Some(ExpectedOutcome::DirtyVisible)
        }
    );
}

// ============================================================================
// Commit
// ============================================================================

#[test]
fn committed_write_is_visible_before_and_after() {
    let db = TestDb::new();
    let scenario = catalog::dirty_read_commit(&db.fixture, IsolationLevel::ReadUncommitted)
        .build()
        .unwrap();

    let result = db.coordinator().run(&scenario).unwrap();

    assert_eq!(result.value("mid"), Some(50));
    assert_eq!(result.value("final"), Some(50));
    assert_eq!(db.committed_balance(db.fixture.account), Some(50));
}

#[test]
fn total_during_transfer_is_short_by_amount() {
    let db = TestDb::new();
    let scenario =
        catalog::dirty_total_during_transfer(&db.fixture, IsolationLevel::ReadUncommitted)
            .build()
            .unwrap();

    let result = db.coordinator().run(&scenario).unwrap();

    assert_eq!(
        result.value("mid-total"),
        Some(db.fixture.total() - db.fixture.amount)
    );
    assert_eq!(result.value("final-total"), Some(db.fixture.total()));
}

// ============================================================================
// Writer mode
// ============================================================================

#[test]
fn serializable_writer_hides_its_write_from_read_uncommitted_observer() {
    // SQLite only shares uncommitted pages between shared-cache sessions
    let db = TestDb::new();
    let scenario = catalog::dirty_read_rollback(&db.fixture, IsolationLevel::ReadUncommitted)
        .level("writer", IsolationLevel::Serializable)
        .build()
        .unwrap();

    let run = db.coordinator().run(&scenario);

    assert_eq!(run.as_ref().unwrap().value("mid"), Some(100));
    assert_eq!(
        judge(&scenario, &run, Engine::Sqlite.capabilities()),
        Verdict::Pass {
            expected: Some(ExpectedOutcome::DirtyHidden)
        }
    );
}
