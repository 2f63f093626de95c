//! Hang Detection Tests
//!
//! A session that never reaches its barrier fails the scenario within the
//! barrier timeout, and every session is rolled back and closed.

use std::time::{Duration, Instant};

use crate::common::*;
use isolab::HangCause;

#[test]
fn stalled_writer_fails_within_barrier_timeout() {
    let db = TestDb::new();
    let scenario = db.quick(catalog::stalled_writer(&db.fixture, IsolationLevel::Serializable));

    let start = Instant::now();
    let err = db.coordinator().run(&scenario).unwrap_err();

    assert!(start.elapsed() < Duration::from_secs(3));
    assert!(matches!(
        err,
        Error::DeadlockOrHang {
            cause: HangCause::Barrier { .. },
            ..
        }
    ));
    assert!(err.is_infrastructure());
}

#[test]
fn hang_releases_the_written_row() {
    let db = TestDb::new();
    let scenario = db.quick(catalog::stalled_writer(&db.fixture, IsolationLevel::ReadUncommitted));
    db.coordinator().run(&scenario).unwrap_err();

    // Uncommitted write is gone and the row takes new writes
    assert_eq!(db.committed_balance(db.fixture.account), Some(100));
    let mut session = db.factory.open(IsolationLevel::ReadUncommitted).unwrap();
    session
        .write(&Write::SetBalance {
            account: db.fixture.account,
            balance: 1,
        })
        .unwrap();
    session.commit().unwrap();
    session.close().unwrap();
    assert_eq!(db.committed_balance(db.fixture.account), Some(1));
}

#[test]
fn hang_error_names_the_barrier() {
    let db = TestDb::new();
    let scenario = db.quick(catalog::stalled_writer(&db.fixture, IsolationLevel::ReadCommitted));

    let err = db.coordinator().run(&scenario).unwrap_err();

    let message = err.to_string();
    assert!(message.contains("stalled_writer"), "{message}");
    assert!(message.contains("'written'"), "{message}");
    assert!(message.contains("1/2"), "{message}");
}

#[test]
fn coordinator_is_reusable_after_a_hang() {
    let db = TestDb::new();
    let coordinator = db.coordinator();
    let stalled = db.quick(catalog::stalled_writer(&db.fixture, IsolationLevel::Serializable));
    coordinator.run(&stalled).unwrap_err();

    let scenario = catalog::dirty_read_rollback(&db.fixture, IsolationLevel::ReadUncommitted)
        .build()
        .unwrap();
    let result = coordinator.run(&scenario).unwrap();
    assert_eq!(result.value("mid"), Some(50));
}
