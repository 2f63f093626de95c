//! Provisioning Tests
//!
//! Migration is idempotent and keeps data; cleanup helpers restore a blank
//! slate between scenarios.

use crate::common::*;

#[test]
fn rerunning_migrate_is_a_noop_that_keeps_data() {
    let db = TestDb::new();
    let before = db.provisioner.current_version().unwrap();

    let report = db.provisioner.migrate().unwrap();

    assert!(report.is_noop());
    assert_eq!(report.current_version, before);
    assert_eq!(db.committed_balance(db.fixture.account), Some(100));
    db.provisioner.validate().unwrap();
}

#[test]
fn truncate_then_seed_restores_fixture() {
    let db = TestDb::new();
    db.provisioner.truncate().unwrap();
    assert_eq!(db.committed_balance(db.fixture.account), None);

    db.reseed();
    assert_eq!(db.committed_balance(db.fixture.other), Some(200));
}

#[test]
fn reset_then_migrate_rebuilds_schema() {
    let db = TestDb::new();
    db.provisioner.reset().unwrap();
    assert_eq!(db.provisioner.current_version().unwrap(), 0);

    let report = db.provisioner.migrate().unwrap();
    assert_eq!(report.applied.len(), db.provisioner.migrations().len());
    db.reseed();

    let scenario = catalog::dirty_read_rollback(&db.fixture, IsolationLevel::ReadUncommitted)
        .build()
        .unwrap();
    assert_eq!(db.coordinator().run(&scenario).unwrap().value("mid"), Some(50));
}
