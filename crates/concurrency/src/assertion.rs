//! Anomaly assertions and verdicts
//!
//! Expectations come from the engine capability table, never from a
//! hardcoded belief about one engine. Each run yields exactly one
//! [`Verdict`].

use serde::Serialize;

use isolab_core::{
    AnomalyMismatch, Capabilities, Error, ExpectedKind, IsolationLevel, Result,
};

use crate::result::ScenarioResult;
use crate::scenario::{DirtyReadExpectation, Scenario};

/// What a dirty-read expectation should observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpectedOutcome {
    /// The mid read sees the uncommitted value
    DirtyVisible,
    /// The mid read sees the committed baseline
    DirtyHidden,
    /// The mid read waits for the writer, so the run hangs by design
    ReaderBlocked,
}

/// Expected outcome for a reader at `observer` against a writer at `writer`.
pub fn expected_outcome(
    capabilities: &Capabilities,
    observer: IsolationLevel,
    writer: IsolationLevel,
) -> ExpectedOutcome {
    if capabilities.exposes_dirty_read(observer, writer) {
        ExpectedOutcome::DirtyVisible
    } else if capabilities.reads_block_on_writers(observer) {
        ExpectedOutcome::ReaderBlocked
    } else {
        ExpectedOutcome::DirtyHidden
    }
}

/// Assert the mid read saw the uncommitted write and the final read (if
/// any) saw the final committed value.
///
/// # Errors
///
/// `InvalidState` if `level` does not permit dirty reads or the result has
/// no expectation; `AnomalyMismatch` if a read disagrees.
pub fn assert_dirty_read_visible(result: &ScenarioResult, level: IsolationLevel) -> Result<()> {
    if !level.permits_dirty_reads() {
        return Err(Error::invalid_state(format!(
            "{} does not permit dirty reads",
            level
        )));
    }
    let expectation = expectation_of(result)?;
    check(
        result,
        expectation,
        level,
        &expectation.mid_read,
        expectation.uncommitted,
        ExpectedKind::UncommittedWrite,
    )?;
    check_final(result, expectation, level)
}

/// Assert the mid read saw the committed baseline and the final read (if
/// any) saw the final committed value.
///
/// # Errors
///
/// `InvalidState` if the result has no expectation; `AnomalyMismatch` if a read
/// disagrees.
pub fn assert_dirty_read_not_visible(result: &ScenarioResult, level: IsolationLevel) -> Result<()> {
    let expectation = expectation_of(result)?;
    check(
        result,
        expectation,
        level,
        &expectation.mid_read,
        expectation.baseline,
        ExpectedKind::Baseline,
    )?;
    check_final(result, expectation, level)
}

fn expectation_of(result: &ScenarioResult) -> Result<&DirtyReadExpectation> {
    result.expectation.as_ref().ok_or_else(|| {
        Error::invalid_state(format!(
            "scenario '{}' has no dirty-read expectation",
            result.scenario
        ))
    })
}

fn check_final(
    result: &ScenarioResult,
    expectation: &DirtyReadExpectation,
    level: IsolationLevel,
) -> Result<()> {
    match &expectation.final_read {
        Some(label) => check(
            result,
            expectation,
            level,
            label,
            expectation.final_value,
            ExpectedKind::FinalValue,
        ),
        None => Ok(()),
    }
}

fn check(
    result: &ScenarioResult,
    expectation: &DirtyReadExpectation,
    level: IsolationLevel,
    label: &str,
    expected: i64,
    expected_kind: ExpectedKind,
) -> Result<()> {
    let observed = result.value(label);
    if observed == Some(expected) {
        return Ok(());
    }
    Err(AnomalyMismatch {
        scenario: result.scenario.clone(),
        observer: expectation.observer.clone(),
        read: label.to_string(),
        level,
        expected,
        expected_kind,
        observed,
    }
    .into())
}

/// Single verdict of a scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "verdict")]
pub enum Verdict {
    /// Observations match the engine's capabilities
    Pass {
        /// What the expectation expected, if the scenario has one
        expected: Option<ExpectedOutcome>,
    },
    /// An observation contradicts the level's contract
    AnomalyMismatch {
        /// Details
        mismatch: AnomalyMismatch,
    },
    /// The environment failed; nothing can be said about isolation
    InfrastructureError {
        /// Error message
        error: String,
    },
}

impl Verdict {
    /// Check for a pass
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass { .. })
    }
}

/// Judge one run of `scenario` against `capabilities`.
///
/// A hang passes only when the capability table says the reader blocks on
/// the writer. A reader that was expected to block but finished passes as
/// long as it saw no dirty data.
pub fn judge(
    scenario: &Scenario,
    run: &Result<ScenarioResult>,
    capabilities: &Capabilities,
) -> Verdict {
    let expected = scenario
        .expectation_levels()
        .map(|(observer, writer)| expected_outcome(capabilities, observer, writer));

    let result = match (expected, run) {
        (Some(ExpectedOutcome::ReaderBlocked), Err(Error::DeadlockOrHang { .. })) => {
            return Verdict::Pass { expected };
        }
        (_, Err(e)) => return infrastructure(e),
        (_, Ok(result)) => result,
    };
    if let Some(failed) = result.failures().next() {
        return Verdict::InfrastructureError {
            error: format!("session '{}' failed: {:?}", failed.name, failed.status),
        };
    }

    let (observer_level, outcome) = match (scenario.expectation_levels(), expected) {
        (Some((observer, _)), Some(outcome)) => (observer, outcome),
        _ => {
            return if result.all_completed() {
                Verdict::Pass { expected: None }
            } else {
                Verdict::InfrastructureError {
                    error: "not every session completed".to_string(),
                }
            };
        }
    };

    let checked = match outcome {
        ExpectedOutcome::DirtyVisible => assert_dirty_read_visible(result, observer_level),
        ExpectedOutcome::DirtyHidden | ExpectedOutcome::ReaderBlocked => {
            assert_dirty_read_not_visible(result, observer_level)
        }
    };
    match checked {
        Ok(()) => Verdict::Pass { expected },
        Err(Error::AnomalyMismatch(mismatch)) => Verdict::AnomalyMismatch {
            mismatch: *mismatch,
        },
        Err(e) => infrastructure(&e),
    }
}

fn infrastructure(e: &Error) -> Verdict {
    Verdict::InfrastructureError {
        error: e.to_string(),
    }
}
