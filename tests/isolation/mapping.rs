//! Level Mapping Tests
//!
//! Every supported level opens a session and round-trips through the
//! controller; unsupported ones fail loudly instead of downgrading.

use crate::common::*;
use isolab::{Capabilities, Support};

#[test]
fn every_level_opens_a_session() {
    let db = TestDb::new();
    for level in IsolationLevel::ALL {
        let mut session = db.factory.open_named("expectation", level).unwrap();
        assert_eq!(session.requested_level(), level);
        assert_eq!(
            Some(session.effective_level()),
            Capabilities::for_engine(Engine::Sqlite).effective_level(level)
        );
        assert_eq!(session.read(&Query::AccountCount).unwrap(), Some(2));
        session.commit().unwrap();
        session.close().unwrap();
    }
}

#[test]
fn controller_never_downgrades() {
    let db = TestDb::new();
    let controller = db.factory.controller();
    for level in IsolationLevel::ALL {
        let effective = controller.resolve(level).unwrap();
        assert!(effective >= level, "{level:?} resolved to {effective:?}");
    }
}

#[test]
fn strengthening_can_be_refused() {
    let db = TestDb::with_strengthening(false);
    let caps = db.factory.controller().capabilities();
    for level in IsolationLevel::ALL {
        let opened = db.factory.open(level);
        match caps.support(level) {
            Support::Native => assert!(opened.is_ok(), "{level:?}"),
            _ => assert!(
                matches!(opened, Err(Error::UnsupportedIsolation { .. })),
                "{level:?}"
            ),
        }
    }
}

#[test]
fn level_changes_between_transactions_only() {
    let db = TestDb::new();
    let mut session = db.factory.open(IsolationLevel::Serializable).unwrap();
    session.begin().unwrap();
    assert!(matches!(
        session.set_isolation(IsolationLevel::Serializable),
        Err(Error::InvalidState { .. })
    ));
    session.rollback().unwrap();
    session.set_isolation(IsolationLevel::RepeatableRead).unwrap();
    assert_eq!(session.effective_level(), IsolationLevel::Serializable);
    session.close().unwrap();
}
