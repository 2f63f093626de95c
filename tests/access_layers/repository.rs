//! Account Repository Tests
//!
//! Repository methods carry fixed levels; the uncommitted variants see a
//! transfer that another session is still holding open. The serializable
//! transfers either conflict, queue on their locks, or retry.

use std::thread;
use std::time::{Duration, Instant};

use crate::common::*;
use isolab::{AccountRepository, TransactionTemplate};

/// Serializable session holding the database write lock until dropped.
fn hold_write_lock(db: &TestDb) -> isolab::Session {
    let mut holder = db.factory.open_named("holder", IsolationLevel::Serializable).unwrap();
    holder
        .write(&Write::AdjustBalance {
            account: db.fixture.other,
            delta: 0,
        })
        .unwrap();
    holder
}

#[test]
fn create_and_move() {
    let db = TestDb::new();
    let repo = AccountRepository::new(db.factory.clone());

    let carol = repo.create_account("carol", 500).unwrap();
    repo.move_amount(carol, db.fixture.account, 200).unwrap();

    assert_eq!(repo.balance_committed(carol).unwrap(), 300);
    assert_eq!(repo.balance(db.fixture.account).unwrap(), 300);
    assert_eq!(repo.total_balances_committed().unwrap(), 800);
}

#[test]
fn uncommitted_variants_see_open_transfer() {
    let db = TestDb::new();
    let repo = AccountRepository::new(db.factory.clone());

    // Half a transfer, held open by a READ UNCOMMITTED writer
    let mut writer = db.factory.open(IsolationLevel::ReadUncommitted).unwrap();
    writer
        .write(&Write::AdjustBalance {
            account: db.fixture.account,
            delta: -40,
        })
        .unwrap();

    assert_eq!(repo.balance(db.fixture.account).unwrap(), 60);
    assert_eq!(repo.total_balances().unwrap(), 260);
    assert_eq!(repo.balance_committed(db.fixture.account).unwrap(), 100);
    assert_eq!(repo.total_balances_committed().unwrap(), 300);

    writer.rollback().unwrap();
    writer.close().unwrap();
    assert_eq!(repo.balance(db.fixture.account).unwrap(), 100);
}

#[test]
fn rollback_only_scope_discards_writes() {
    let db = TestDb::new();
    let template = TransactionTemplate::new(db.factory.clone(), IsolationLevel::Serializable);

    let seen = template
        .execute("rollback-only", |tx| {
            tx.write(&Write::SetBalance {
                account: db.fixture.account,
                balance: 0,
            })?;
            tx.set_rollback_only();
            tx.read(&Query::Balance(db.fixture.account))
        })
        .unwrap();

    assert_eq!(seen, Some(0));
    assert_eq!(db.committed_balance(db.fixture.account), Some(100));
}

#[test]
fn read_only_template_rejects_writes() {
    let db = TestDb::new();
    let template =
        TransactionTemplate::new(db.factory.clone(), IsolationLevel::Serializable).read_only(true);

    let err = template
        .execute("read-only", |tx| {
            tx.write(&Write::SetBalance {
                account: db.fixture.account,
                balance: 0,
            })
        })
        .unwrap_err();

    assert!(matches!(err, Error::InvalidState { .. }));
    assert_eq!(db.committed_balance(db.fixture.account), Some(100));
}

#[test]
fn unlocked_serializable_transfer_conflicts_with_a_writer() {
    let db = TestDb::new();
    let repo = AccountRepository::new(db.factory.clone());
    let mut holder = hold_write_lock(&db);

    let err = repo
        .move_amount_serializable_unlocked(db.fixture.account, db.fixture.other, 10)
        .unwrap_err();

    assert!(err.is_retryable(), "{err}");
    holder.rollback().unwrap();
    assert_eq!(db.committed_balance(db.fixture.account), Some(100));
    assert_eq!(db.committed_balance(db.fixture.other), Some(200));
}

#[test]
fn locking_transfer_waits_for_the_writer() {
    let db = TestDb::new();
    let repo = AccountRepository::new(db.factory.clone());
    let mut holder = hold_write_lock(&db);

    let start = Instant::now();
    thread::scope(|s| {
        let transfer = s.spawn(|| {
            repo.move_amount_serializable_locking(db.fixture.other, db.fixture.account, 50)
        });
        thread::sleep(Duration::from_millis(100));
        holder.commit().unwrap();
        transfer.join().unwrap().unwrap();
    });

    assert!(start.elapsed() >= Duration::from_millis(100));
    assert_eq!(db.committed_balance(db.fixture.account), Some(150));
    assert_eq!(db.committed_balance(db.fixture.other), Some(150));
}

#[test]
fn retrying_transfer_outlasts_the_writer() {
    let db = TestDb::new();
    let repo = AccountRepository::new(db.factory.clone());
    let mut holder = hold_write_lock(&db);

    thread::scope(|s| {
        let transfer = s.spawn(|| {
            repo.move_amount_serializable_retrying(db.fixture.account, db.fixture.other, 10)
        });
        thread::sleep(Duration::from_millis(50));
        holder.rollback().unwrap();
        transfer.join().unwrap().unwrap();
    });

    assert_eq!(db.committed_balance(db.fixture.account), Some(90));
    assert_eq!(db.committed_balance(db.fixture.other), Some(210));
}

#[test]
fn concurrent_locking_transfers_all_commit() {
    let db = TestDb::new();
    let repo = AccountRepository::new(db.factory.clone());
    let (alice, bob) = (db.fixture.account, db.fixture.other);

    let errors = hammer(|| repo.move_amount_serializable_locking(alice, bob, 1));

    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(repo.balance_committed(alice).unwrap(), 0);
    assert_eq!(repo.balance_committed(bob).unwrap(), 300);
}

#[test]
fn concurrent_retrying_transfers_all_commit() {
    let db = TestDb::new();
    let repo = AccountRepository::new(db.factory.clone());
    let (alice, bob) = (db.fixture.account, db.fixture.other);

    let errors = hammer(|| repo.move_amount_serializable_retrying(alice, bob, 1));

    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(repo.balance_committed(alice).unwrap(), 0);
    assert_eq!(repo.balance_committed(bob).unwrap(), 300);
}

#[test]
fn concurrent_unlocked_transfers_lose_work_but_keep_the_total() {
    let db = TestDb::new();
    let repo = AccountRepository::new(db.factory.clone());
    let (alice, bob) = (db.fixture.account, db.fixture.other);

    let errors = hammer(|| repo.move_amount_serializable_unlocked(alice, bob, 1));

    assert!(errors.iter().all(Error::is_retryable), "{:?}", errors);
    let moved = 100 - errors.len() as i64;
    assert_eq!(repo.balance_committed(alice).unwrap(), 100 - moved);
    assert_eq!(repo.balance_committed(bob).unwrap(), 200 + moved);
    assert_eq!(repo.total_balances_committed().unwrap(), 300);
}

#[test]
fn retry_budget_is_bounded() {
    let db = TestDb::new();
    let template = TransactionTemplate::new(db.factory.clone(), IsolationLevel::Serializable)
        .retrying(3, Duration::ZERO);
    let mut attempts = 0;

    let err = template
        .execute("always-conflicts", |_| -> Result<(), Error> {
            attempts += 1;
            Err(Error::Conflict {
                reason: "deadlock".to_string(),
            })
        })
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(attempts, 3);
}
