//! Account DAO Tests

use std::thread;

use crate::common::*;
use isolab::AccountDao;

#[test]
fn fixture_accounts_are_readable_at_every_level() {
    let db = TestDb::new();
    for level in IsolationLevel::ALL {
        let dao = AccountDao::new(db.factory.clone(), level);
        assert_eq!(dao.balance(db.fixture.account).unwrap(), 100, "{level:?}");
        assert_eq!(dao.total_balances().unwrap(), 300, "{level:?}");
    }
}

#[test]
fn page_items_and_total_agree_at_serializable() {
    let db = TestDb::new();
    let dao = AccountDao::new(db.factory.clone(), IsolationLevel::Serializable);

    thread::scope(|s| {
        let writer = dao.clone();
        s.spawn(move || {
            for i in 0..40 {
                writer.create_account(&format!("holder-{i}"), 1000).unwrap();
            }
        });
        for _ in 0..20 {
            let page = dao.accounts(0, 100).unwrap();
            assert_eq!(page.len() as u64, page.total);
        }
    });

    let page = dao.accounts(0, 100).unwrap();
    assert_eq!(page.total, 42);
    assert_eq!(page.len(), 42);
}

#[test]
fn concurrent_read_uncommitted_transfers_all_commit() {
    let db = TestDb::new();
    let dao = AccountDao::new(db.factory.clone(), IsolationLevel::ReadUncommitted);
    let (alice, bob) = (db.fixture.account, db.fixture.other);

    let errors: Vec<Error> = thread::scope(|s| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let dao = dao.clone();
                s.spawn(move || {
                    (0..25)
                        .filter_map(|_| dao.move_amount(alice, bob, 1).err())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect()
    });

    assert!(errors.is_empty(), "{} transfers failed, first: {}", errors.len(), errors[0]);
    assert_eq!(db.committed_balance(alice), Some(0));
    assert_eq!(db.committed_balance(bob), Some(300));
    assert_eq!(dao.total_balances().unwrap(), 300);
}

#[test]
fn failed_transfer_is_rolled_back() {
    let db = TestDb::new();
    let dao = AccountDao::new(db.factory.clone(), IsolationLevel::ReadCommitted);

    let err = dao
        .move_amount(db.fixture.account, AccountId(404), 25)
        .unwrap_err();

    assert!(matches!(err, Error::NotFound { .. }));
    assert_eq!(db.committed_balance(db.fixture.account), Some(100));
    assert_eq!(dao.total_balances().unwrap(), 300);
}
