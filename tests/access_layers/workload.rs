//! Transfer Workload Tests

use std::time::Duration;

use crate::common::*;
use isolab::{AccountDao, TransferWorkload};

#[test]
fn committed_samples_always_see_the_invariant_total() {
    let db = TestDb::new();
    let writer = AccountDao::new(db.factory.clone(), IsolationLevel::ReadCommitted);
    let reader = AccountDao::new(db.factory.clone(), IsolationLevel::ReadCommitted);
    let accounts = vec![db.fixture.account, db.fixture.other];

    let report = TransferWorkload::new(accounts)
        .workers(3)
        .transfers_per_worker(20)
        .amount(7)
        .samples(30, Duration::from_millis(1))
        .run(&writer, &reader)
        .unwrap();

    assert_eq!(report.expected_total, 300);
    assert_eq!(report.samples.len(), 30);
    assert!(report.is_consistent(), "{:?}", report.samples);
    assert_eq!((report.committed, report.failed), (60, 0));
    // Each worker alternates direction over an even number of transfers
    assert_eq!(db.committed_balance(db.fixture.account), Some(100));
    assert_eq!(db.committed_balance(db.fixture.other), Some(200));
}

#[test]
fn uncommitted_samples_see_totals_that_never_existed() {
    let db = TestDb::new();
    let writer = AccountDao::new(db.factory.clone(), IsolationLevel::ReadUncommitted);
    let reader = AccountDao::new(db.factory.clone(), IsolationLevel::ReadUncommitted);
    let accounts = vec![db.fixture.account, db.fixture.other];

    let report = TransferWorkload::new(accounts)
        .workers(2)
        .transfers_per_worker(10)
        .amount(10)
        .hold(Duration::from_millis(5))
        .samples(20, Duration::from_millis(1))
        .run(&writer, &reader)
        .unwrap();

    assert_eq!(report.expected_total, 300);
    assert_eq!((report.committed, report.failed), (20, 0));
    assert!(report.inconsistent_samples() > 0, "{:?}", report.samples);
    assert!(report.samples.iter().all(|s| *s == 300 || *s == 290));
    assert_eq!(db.committed_balance(db.fixture.account), Some(100));
    assert_eq!(db.committed_balance(db.fixture.other), Some(200));
}

#[test]
fn workload_needs_two_accounts() {
    let db = TestDb::new();
    let dao = AccountDao::new(db.factory.clone(), IsolationLevel::Serializable);

    let err = TransferWorkload::new(vec![db.fixture.account])
        .run(&dao, &dao)
        .unwrap_err();

    assert!(matches!(err, Error::InvalidState { .. }));
}
