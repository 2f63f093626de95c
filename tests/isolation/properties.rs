//! Property Tests
//!
//! Dirty-read visibility holds for arbitrary balances, not just the fixture.

use proptest::prelude::*;

use crate::common::*;
use isolab::{assert_dirty_read_not_visible, assert_dirty_read_visible};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn dirty_read_sees_any_uncommitted_value(
        baseline in -1_000_000i64..1_000_000,
        uncommitted in -1_000_000i64..1_000_000,
    ) {
        prop_assume!(baseline != uncommitted);
        let db = TestDb::new();
        let fixture = Fixture { baseline, uncommitted, ..db.fixture.clone() };
        fixture.seed(db.factory.as_ref()).unwrap();

        let dirty = catalog::dirty_read_rollback(&fixture, IsolationLevel::ReadUncommitted)
            .build()
            .unwrap();
        let result = db.coordinator().run(&dirty).unwrap();
        prop_assert_eq!(result.value("mid"), Some(uncommitted));
        prop_assert!(assert_dirty_read_visible(&result, IsolationLevel::ReadUncommitted).is_ok());

        let strict = catalog::dirty_read_rollback(&fixture, IsolationLevel::Serializable)
            .build()
            .unwrap();
        let result = db.coordinator().run(&strict).unwrap();
        prop_assert_eq!(result.value("mid"), Some(baseline));
        prop_assert!(assert_dirty_read_not_visible(&result, IsolationLevel::Serializable).is_ok());
    }
}
