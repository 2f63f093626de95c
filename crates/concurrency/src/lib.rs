//! Interleaving coordinator and anomaly assertions
//!
//! This crate drives multi-session scenarios deterministically:
//! - Scenario: named session scripts validated at build time
//! - Barrier: counted rendezvous, the only ordering between sessions
//! - Coordinator: one thread per session, barrier timeouts and a deadline
//! - Assertions: expected dirty-read outcomes from the capability table
//! - Catalog: the built-in dirty-read scenarios

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assertion;
pub mod barrier;
pub mod cancel;
pub mod catalog;
pub mod coordinator;
mod executor;
pub mod result;
pub mod scenario;

pub use assertion::{
    assert_dirty_read_not_visible, assert_dirty_read_visible, expected_outcome, judge,
    ExpectedOutcome, Verdict,
};
pub use barrier::{Barrier, BarrierWait};
pub use cancel::CancelToken;
pub use catalog::{CatalogEntry, Fixture};
pub use coordinator::Coordinator;
pub use result::{ObservedValue, ScenarioResult, SessionOutcome, SessionStatus};
pub use scenario::{
    DirtyReadExpectation, Scenario, ScenarioBuilder, SessionScript, Step, DEFAULT_BARRIER_TIMEOUT,
    DEFAULT_CLEANUP_GRACE, DEFAULT_DEADLINE,
};
