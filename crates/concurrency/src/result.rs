//! Scenario run outputs

use serde::Serialize;
use std::time::Duration;

use isolab_core::{Engine, IsolationLevel, RunId, TransactionState};

use crate::scenario::DirtyReadExpectation;

/// Value recorded by a `Read` step. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservedValue {
    /// Session that read
    pub session: String,
    /// Declaration index of that session
    pub session_index: usize,
    /// Position of the step in the session's script
    pub step: usize,
    /// Read label
    pub label: String,
    /// Value read; None for no row or NULL
    pub value: Option<i64>,
}

/// How a session's script ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum SessionStatus {
    /// Every step ran
    Completed,
    /// A step failed; later steps did not run
    Failed {
        /// Failing step
        step: usize,
        /// Error message
        error: String,
    },
    /// The run was cancelled, or a barrier this session needed was abandoned
    Cancelled {
        /// Step that was about to run or was interrupted
        step: usize,
        /// Why
        reason: String,
    },
}

impl SessionStatus {
    /// Check if the script ran to the end
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionStatus::Completed)
    }
}

/// Per-session report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionOutcome {
    /// Session name
    pub name: String,
    /// Declaration index
    pub index: usize,
    /// Requested level
    pub requested: IsolationLevel,
    /// Level the engine ran
    pub effective: IsolationLevel,
    /// How the script ended
    pub status: SessionStatus,
    /// Steps that ran to completion
    pub steps_completed: usize,
    /// Transaction state when the script ended, before cleanup
    pub final_state: TransactionState,
}

/// Everything a scenario run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Unique id of this run
    pub run_id: RunId,
    /// Scenario name
    pub scenario: String,
    /// Engine the run used
    pub engine: Engine,
    /// Observations ordered by (session index, step)
    pub observations: Vec<ObservedValue>,
    /// Sessions in declaration order
    pub sessions: Vec<SessionOutcome>,
    /// Wall time of the run
    pub elapsed: Duration,
    /// Dirty-read expectations copied from the scenario
    pub expectation: Option<DirtyReadExpectation>,
}

impl ScenarioResult {
    /// Observation recorded under `label`.
    pub fn observation(&self, label: &str) -> Option<&ObservedValue> {
        self.observations.iter().find(|o| o.label == label)
    }

    /// Value recorded under `label`; None if the read never ran or found nothing.
    pub fn value(&self, label: &str) -> Option<i64> {
        self.observation(label).and_then(|o| o.value)
    }

    /// `(label, value)` pairs in observation order.
    pub fn sequence(&self) -> Vec<(String, Option<i64>)> {
        self.observations
            .iter()
            .map(|o| (o.label.clone(), o.value))
            .collect()
    }

    /// Outcome of the session called `name`.
    pub fn session(&self, name: &str) -> Option<&SessionOutcome> {
        self.sessions.iter().find(|s| s.name == name)
    }

    /// True if every session completed its script.
    pub fn all_completed(&self) -> bool {
        self.sessions.iter().all(|s| s.status.is_completed())
    }

    /// Sessions that failed on a statement.
    pub fn failures(&self) -> impl Iterator<Item = &SessionOutcome> {
        self.sessions
            .iter()
            .filter(|s| matches!(s.status, SessionStatus::Failed { .. }))
    }
}
