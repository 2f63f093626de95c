//! Barrier Determinism Tests
//!
//! Repeated runs of a barrier-ordered scenario observe identical sequences.

use crate::common::*;

#[test]
fn repeated_runs_observe_identical_sequences() {
    let db = TestDb::new();
    let coordinator = db.coordinator();

    for level in [IsolationLevel::ReadUncommitted, IsolationLevel::Serializable] {
        let scenario = catalog::dirty_read_rollback(&db.fixture, level).build().unwrap();
        let first = coordinator.run(&scenario).unwrap().sequence();

        for _ in 0..10 {
            db.reseed();
            let again = coordinator.run(&scenario).unwrap().sequence();
            assert_eq!(again, first, "{level:?}");
        }
    }
}

#[test]
fn observations_are_ordered_by_session_then_step() {
    let db = TestDb::new();
    let a = db.fixture.account;
    let b = db.fixture.other;
    let scenario = Scenario::builder("ordered")
        .session(
            "first",
            IsolationLevel::Serializable,
            [
                Step::read_balance("first-a", a),
                Step::barrier("sync"),
                Step::read_balance("first-b", b),
                Step::Commit,
            ],
        )
        .session(
            "second",
            IsolationLevel::Serializable,
            [
                Step::read_balance("second-b", b),
                Step::barrier("sync"),
                Step::read("second-count", Query::AccountCount),
                Step::Commit,
            ],
        )
        .build()
        .unwrap();

    let result = db.coordinator().run(&scenario).unwrap();

    let labels: Vec<String> = result.sequence().into_iter().map(|(l, _)| l).collect();
    assert_eq!(labels, ["first-a", "first-b", "second-b", "second-count"]);
    assert_eq!(result.value("second-count"), Some(2));
}

#[test]
fn write_before_barrier_is_visible_after_it() {
    let db = TestDb::new();
    let a = db.fixture.account;
    let scenario = Scenario::builder("handoff")
        .session(
            "producer",
            IsolationLevel::Serializable,
            [Step::set_balance(a, 999), Step::Commit, Step::barrier("published")],
        )
        .session(
            "consumer",
            IsolationLevel::Serializable,
            [Step::barrier("published"), Step::read_balance("seen", a), Step::Commit],
        )
        .build()
        .unwrap();

    for _ in 0..5 {
        db.reseed();
        let result = db.coordinator().run(&scenario).unwrap();
        assert_eq!(result.value("seen"), Some(999));
    }
}
