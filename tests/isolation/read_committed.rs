//! Committed-Read Tests
//!
//! At READ COMMITTED or stricter the same interleavings observe only
//! committed values.

use crate::common::*;
use isolab::{assert_dirty_read_not_visible, judge};

const STRICT: [IsolationLevel; 3] = [
    IsolationLevel::ReadCommitted,
    IsolationLevel::RepeatableRead,
    IsolationLevel::Serializable,
];

#[test]
fn rolled_back_write_is_never_seen() {
    let db = TestDb::new();
    for level in STRICT {
        db.reseed();
        let scenario = catalog::dirty_read_rollback(&db.fixture, level).build().unwrap();

        let result = db.coordinator().run(&scenario).unwrap();

        assert_eq!(result.value("mid"), Some(100), "{level:?}");
        assert_eq!(result.value("final"), Some(100), "{level:?}");
        assert_dirty_read_not_visible(&result, level).unwrap();
    }
}

#[test]
fn committed_write_is_seen_only_after_commit() {
    let db = TestDb::new();
    for level in STRICT {
        db.reseed();
        let scenario = catalog::dirty_read_commit(&db.fixture, level).build().unwrap();

        let result = db.coordinator().run(&scenario).unwrap();

        assert_eq!(result.value("mid"), Some(100), "{level:?}");
        assert_eq!(result.value("final"), Some(50), "{level:?}");
    }
}

#[test]
fn total_stays_invariant_during_transfer() {
    let db = TestDb::new();
    for level in STRICT {
        db.reseed();
        let scenario = catalog::dirty_total_during_transfer(&db.fixture, level)
            .build()
            .unwrap();

        let run = db.coordinator().run(&scenario);

        let result = run.as_ref().unwrap();
        assert_eq!(result.value("mid-total"), Some(db.fixture.total()));
        assert_eq!(result.value("final-total"), Some(db.fixture.total()));
        assert!(judge(&scenario, &run, Engine::Sqlite.capabilities()).is_pass());
    }
}

#[test]
fn strict_levels_run_as_serializable_on_sqlite() {
    let db = TestDb::new();
    let scenario = catalog::dirty_read_rollback(&db.fixture, IsolationLevel::RepeatableRead)
        .build()
        .unwrap();

    let result = db.coordinator().run(&scenario).unwrap();

    let observer = result.session("observer").unwrap();
    assert_eq!(observer.requested, IsolationLevel::RepeatableRead);
    assert_eq!(observer.effective, IsolationLevel::Serializable);
}
