//! Scenario definition
//!
//! A scenario is a set of named session scripts. Steps within one script run
//! in order; steps across scripts are ordered only by barriers. Everything
//! that can be checked statically is checked by [`ScenarioBuilder::build`].

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use isolab_core::{AccountId, Error, HarnessConfig, IsolationLevel, Query, Result, Write};

/// Default per-barrier timeout.
pub const DEFAULT_BARRIER_TIMEOUT: Duration = Duration::from_secs(5);
/// Default whole-scenario deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);
/// Default wait for executors to stop after a run is cancelled.
pub const DEFAULT_CLEANUP_GRACE: Duration = Duration::from_secs(5);

/// One step of a session script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "step", content = "args")]
pub enum Step {
    /// Start a read-write transaction
    Begin,
    /// Start a read-only transaction
    BeginReadOnly,
    /// Run a write
    Write(Write),
    /// Run a read and record its value under `label`
    Read {
        /// Name of the observation
        label: String,
        /// What to read
        query: Query,
    },
    /// Wait for every session that references this barrier
    Barrier(String),
    /// Sleep; cut short if the scenario is cancelled
    Pause(Duration),
    /// Commit the transaction
    Commit,
    /// Roll back the transaction
    Rollback,
}

impl Step {
    /// `Read` step.
    pub fn read(label: impl Into<String>, query: Query) -> Self {
        Step::Read {
            label: label.into(),
            query,
        }
    }

    /// `Read` of one account's balance.
    pub fn read_balance(label: impl Into<String>, account: AccountId) -> Self {
        Self::read(label, Query::Balance(account))
    }

    /// `Barrier` step.
    pub fn barrier(name: impl Into<String>) -> Self {
        Step::Barrier(name.into())
    }

    /// `Write` overwriting a balance.
    pub fn set_balance(account: AccountId, balance: i64) -> Self {
        Step::Write(Write::SetBalance { account, balance })
    }

    /// `Write` adding `delta` to a balance.
    pub fn adjust_balance(account: AccountId, delta: i64) -> Self {
        Step::Write(Write::AdjustBalance { account, delta })
    }
}

/// Script of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionScript {
    /// Session name, unique within the scenario
    pub name: String,
    /// Requested isolation level
    pub level: IsolationLevel,
    /// Steps, in order
    pub steps: Vec<Step>,
}

impl SessionScript {
    /// Barriers this script references, in program order.
    pub fn barriers(&self) -> impl Iterator<Item = (usize, &str)> {
        self.steps.iter().enumerate().filter_map(|(i, s)| match s {
            Step::Barrier(name) => Some((i, name.as_str())),
            _ => None,
        })
    }

    fn read_labels(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|s| match s {
            Step::Read { label, .. } => Some(label.as_str()),
            _ => None,
        })
    }
}

/// Expected values for a dirty-read check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirtyReadExpectation {
    /// Session doing the reads
    pub observer: String,
    /// Session holding the uncommitted write
    pub writer: String,
    /// Read taken while the write is uncommitted
    pub mid_read: String,
    /// Read taken after the writer finished, if any
    pub final_read: Option<String>,
    /// Committed value before the writer started
    pub baseline: i64,
    /// Value written but not yet committed
    pub uncommitted: i64,
    /// Committed value after the writer finished
    pub final_value: i64,
}

/// A validated scenario.
#[derive(Debug, Clone, Serialize)]
pub struct Scenario {
    name: String,
    sessions: Vec<SessionScript>,
    barriers: BTreeMap<String, usize>,
    barrier_timeout: Duration,
    deadline: Duration,
    cleanup_grace: Duration,
    expectation: Option<DirtyReadExpectation>,
}

impl Scenario {
    /// Start building a scenario called `name`.
    pub fn builder(name: impl Into<String>) -> ScenarioBuilder {
        ScenarioBuilder::new(name)
    }

    /// Scenario name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Session scripts, in declaration order.
    pub fn sessions(&self) -> &[SessionScript] {
        &self.sessions
    }

    /// Script of the session called `name`.
    pub fn session(&self, name: &str) -> Option<&SessionScript> {
        self.sessions.iter().find(|s| s.name == name)
    }

    /// Barrier names with their participant counts.
    pub fn barriers(&self) -> &BTreeMap<String, usize> {
        &self.barriers
    }

    /// Per-barrier timeout.
    pub fn barrier_timeout(&self) -> Duration {
        self.barrier_timeout
    }

    /// Whole-scenario deadline.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// How long a cancelled run waits for its executors before giving up on
    /// the ones still blocked in a statement.
    pub fn cleanup_grace(&self) -> Duration {
        self.cleanup_grace
    }

    /// Dirty-read expectations, if the scenario carries them.
    pub fn expectation(&self) -> Option<&DirtyReadExpectation> {
        self.expectation.as_ref()
    }

    /// Observer and writer levels named by the expectation.
    pub fn expectation_levels(&self) -> Option<(IsolationLevel, IsolationLevel)> {
        let expectation = self.expectation.as_ref()?;
        Some((
            self.session(&expectation.observer)?.level,
            self.session(&expectation.writer)?.level,
        ))
    }
}

/// Builder for [`Scenario`].
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    name: String,
    sessions: Vec<SessionScript>,
    barrier_timeout: Duration,
    deadline: Duration,
    cleanup_grace: Duration,
    expectation: Option<DirtyReadExpectation>,
    unknown_overrides: Vec<String>,
}

impl ScenarioBuilder {
    /// Empty scenario with default timeouts.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sessions: Vec::new(),
            barrier_timeout: DEFAULT_BARRIER_TIMEOUT,
            deadline: DEFAULT_DEADLINE,
            cleanup_grace: DEFAULT_CLEANUP_GRACE,
            expectation: None,
            unknown_overrides: Vec::new(),
        }
    }

    /// Add a session script.
    pub fn session(
        mut self,
        name: impl Into<String>,
        level: IsolationLevel,
        steps: impl IntoIterator<Item = Step>,
    ) -> Self {
        self.sessions.push(SessionScript {
            name: name.into(),
            level,
            steps: steps.into_iter().collect(),
        });
        self
    }

    /// Override a session's level after the fact. Naming a session that was
    /// never added makes [`ScenarioBuilder::build`] fail.
    pub fn level(mut self, session: &str, level: IsolationLevel) -> Self {
        match self.sessions.iter_mut().find(|s| s.name == session) {
            Some(s) => s.level = level,
            None => self.unknown_overrides.push(session.to_string()),
        }
        self
    }

    /// Per-barrier timeout.
    pub fn barrier_timeout(mut self, timeout: Duration) -> Self {
        self.barrier_timeout = timeout;
        self
    }

    /// Whole-scenario deadline.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Wait after cancellation for executors to clean up.
    pub fn cleanup_grace(mut self, grace: Duration) -> Self {
        self.cleanup_grace = grace;
        self
    }

    /// Take both timeouts from the `[coordinator]` section.
    pub fn timeouts_from(self, config: &HarnessConfig) -> Self {
        self.barrier_timeout(config.barrier_timeout())
            .deadline(config.deadline())
    }

    /// Attach dirty-read expectations.
    pub fn expectation(mut self, expectation: DirtyReadExpectation) -> Self {
        self.expectation = Some(expectation);
        self
    }

    /// Validate and freeze the scenario.
    ///
    /// # Errors
    ///
    /// `InvalidState` if there are fewer than two sessions, duplicate session
    /// names or read labels, a session references a barrier twice, a barrier
    /// has fewer than two participants, a timeout is zero, a level override
    /// or the expectation names a session that does not exist, or the expectation names a
    /// read that does not exist.
    pub fn build(self) -> Result<Scenario> {
        let invalid = |reason: String| Error::invalid_state(format!("scenario '{}': {}", self.name, reason));

        if self.sessions.len() < 2 {
            return Err(invalid("needs at least two sessions".to_string()));
        }
        if self.barrier_timeout.is_zero() || self.deadline.is_zero() {
            return Err(invalid("timeouts must be positive".to_string()));
        }
        if let Some(name) = self.unknown_overrides.first() {
            return Err(invalid(format!("level override names unknown session '{}'", name)));
        }

        let mut names = HashSet::new();
        let mut labels = HashSet::new();
        let mut barriers: BTreeMap<String, usize> = BTreeMap::new();
        for script in &self.sessions {
            if !names.insert(script.name.as_str()) {
                return Err(invalid(format!("duplicate session '{}'", script.name)));
            }
            for label in script.read_labels() {
                if !labels.insert(label) {
                    return Err(invalid(format!("duplicate read label '{}'", label)));
                }
            }
            let mut seen = HashSet::new();
            for (_, barrier) in script.barriers() {
                if !seen.insert(barrier) {
                    return Err(invalid(format!(
                        "session '{}' references barrier '{}' more than once",
                        script.name, barrier
                    )));
                }
                *barriers.entry(barrier.to_string()).or_default() += 1;
            }
        }
        if let Some((name, _)) = barriers.iter().find(|(_, n)| **n < 2) {
            return Err(invalid(format!(
                "barrier '{}' is referenced by only one session",
                name
            )));
        }

        if let Some(expectation) = &self.expectation {
            let observer = self
                .sessions
                .iter()
                .find(|s| s.name == expectation.observer)
                .ok_or_else(|| {
                    invalid(format!(
                        "expectation observer '{}' is not a session",
                        expectation.observer
                    ))
                })?;
            if !names.contains(expectation.writer.as_str()) {
                return Err(invalid(format!(
                    "expectation writer '{}' is not a session",
                    expectation.writer
                )));
            }
            let observer_labels: HashSet<&str> = observer.read_labels().collect();
            let reads = std::iter::once(&expectation.mid_read).chain(expectation.final_read.iter());
            for label in reads {
                if !observer_labels.contains(label.as_str()) {
                    return Err(invalid(format!(
                        "expectation read '{}' is not a read of '{}'",
                        label, expectation.observer
                    )));
                }
            }
        }

        Ok(Scenario {
            name: self.name,
            sessions: self.sessions,
            barriers,
            barrier_timeout: self.barrier_timeout,
            deadline: self.deadline,
            cleanup_grace: self.cleanup_grace,
            expectation: self.expectation,
        })
    }
}
