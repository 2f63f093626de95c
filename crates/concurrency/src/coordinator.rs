//! Interleaving coordinator
//!
//! Runs a scenario with one OS thread per session:
//!
//! 1. Open every session, in declaration order
//! 2. Collect interrupt handles, then spawn one executor thread per session
//! 3. Wait for executor reports until the scenario deadline
//! 4. On a barrier timeout or the deadline: cancel, break barriers, interrupt
//!    in-flight statements, and wait up to the cleanup grace for every
//!    executor to roll back and close its session
//!
//! Barriers are the only ordering between sessions. A read that follows a
//! barrier observes every write that completed before the barrier on another
//! session.

use crossbeam_channel::RecvTimeoutError;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{info, warn};

use isolab_core::{Error, HangCause, Result, RunId};
use isolab_session::{Session, SessionFactory};

use crate::executor::{run_session, ExecutorReport, RunControl};
use crate::result::ScenarioResult;
use crate::scenario::Scenario;

/// Drives scenarios against sessions from one factory.
pub struct Coordinator {
    factory: Arc<dyn SessionFactory>,
}

impl Coordinator {
    /// Coordinator opening sessions through `factory`.
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self { factory }
    }

    /// Factory sessions are opened from.
    pub fn factory(&self) -> &Arc<dyn SessionFactory> {
        &self.factory
    }

    /// Run `scenario` once.
    ///
    /// Statement errors do not fail the run: the session is reported as
    /// failed in the result and its peers stop at the barriers it abandoned.
    ///
    /// # Errors
    ///
    /// - `Connection` / `UnsupportedIsolation` if a session cannot be opened
    ///   (sessions already opened are closed)
    /// - `DeadlockOrHang` if a barrier times out or the deadline passes; every
    ///   session has been rolled back and closed by then, except those listed
    ///   as unresponsive
    pub fn run(&self, scenario: &Scenario) -> Result<ScenarioResult> {
        let run_id = RunId::new();
        let start = Instant::now();
        info!(
            target: "isolab::coordinator",
            scenario = scenario.name(),
            run_id = %run_id,
            sessions = scenario.sessions().len(),
            "Scenario started"
        );

        let sessions = self.open_sessions(scenario)?;
        let interrupts = match sessions
            .iter()
            .map(Session::interrupt_handle)
            .collect::<Result<Vec<_>>>()
        {
            Ok(handles) => handles,
            Err(e) => {
                close_all(sessions);
                return Err(e);
            }
        };
        let control = Arc::new(RunControl::new(scenario, interrupts));

        let mut reports: Vec<Option<ExecutorReport>> =
            (0..scenario.sessions().len()).map(|_| None).collect();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut spawned = 0;
        let mut spawn_error = None;
        for (index, (script, session)) in scenario.sessions().iter().zip(sessions).enumerate() {
            let tx = tx.clone();
            let thread_control = Arc::clone(&control);
            let script = script.clone();
            let handle = thread::Builder::new()
                .name(format!("isolab-{}", script.name))
                .spawn(move || {
                    let report = run_session(index, &script, session, &thread_control);
                    let _ = tx.send((index, report));
                });
            match handle {
                Ok(_) => spawned += 1,
                Err(e) => {
                    control.cancel(format!("failed to spawn executor: {}", e));
                    spawn_error = Some(Error::Io(e));
                    break;
                }
            }
        }
        drop(tx);

        let deadline = start + scenario.deadline();
        let mut grace_until: Option<Instant> = None;
        let mut received = 0;
        while received < spawned {
            if grace_until.is_none() && control.is_cancelled() {
                grace_until = Some(Instant::now() + scenario.cleanup_grace());
            }
            match rx.recv_deadline(grace_until.unwrap_or(deadline)) {
                Ok((index, report)) => {
                    reports[index] = Some(report);
                    received += 1;
                }
                Err(RecvTimeoutError::Timeout) if grace_until.is_some() => break,
                Err(RecvTimeoutError::Timeout) => control.abort(HangCause::Deadline {
                    deadline: scenario.deadline(),
                }),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Executors that never reported are still blocked in a statement the
        // interrupt did not stop. Their threads are detached.
        let unresponsive: Vec<String> = scenario.sessions()[..spawned]
            .iter()
            .zip(&reports)
            .filter(|(_, report)| report.is_none())
            .map(|(script, _)| script.name.clone())
            .collect();
        if !unresponsive.is_empty() {
            warn!(
                target: "isolab::coordinator",
                scenario = scenario.name(),
                run_id = %run_id,
                sessions = ?unresponsive,
                grace_ms = scenario.cleanup_grace().as_millis() as u64,
                "Sessions did not stop within the cleanup grace, abandoning them"
            );
        }

        let elapsed = start.elapsed();
        if let Some(e) = spawn_error {
            return Err(e);
        }

        let mut observations = Vec::new();
        let mut outcomes = Vec::new();
        for report in reports.into_iter().flatten() {
            observations.extend(report.observations);
            outcomes.push(report.outcome);
        }
        observations.sort_by_key(|o| (o.session_index, o.step));

        if let Some(cause) = control.hang() {
            warn!(
                target: "isolab::coordinator",
                scenario = scenario.name(),
                run_id = %run_id,
                cause = %cause,
                "Scenario hung, all sessions rolled back"
            );
            return Err(Error::DeadlockOrHang {
                scenario: scenario.name().to_string(),
                cause,
                unresponsive,
            });
        }

        info!(
            target: "isolab::coordinator",
            scenario = scenario.name(),
            run_id = %run_id,
            elapsed_ms = elapsed.as_millis() as u64,
            observations = observations.len(),
            "Scenario finished"
        );
        Ok(ScenarioResult {
            run_id,
            scenario: scenario.name().to_string(),
            engine: self.factory.engine(),
            observations,
            sessions: outcomes,
            elapsed,
            expectation: scenario.expectation().cloned(),
        })
    }

    fn open_sessions(&self, scenario: &Scenario) -> Result<Vec<Session>> {
        let mut opened = Vec::with_capacity(scenario.sessions().len());
        for script in scenario.sessions() {
            match self.factory.open_named(&script.name, script.level) {
                Ok(session) => opened.push(session),
                Err(e) => {
                    warn!(
                        target: "isolab::coordinator",
                        scenario = scenario.name(),
                        session = %script.name,
                        level = %script.level,
                        error = %e,
                        "Failed to open session"
                    );
                    close_all(opened);
                    return Err(e);
                }
            }
        }
        Ok(opened)
    }
}

fn close_all(sessions: Vec<Session>) {
    for session in sessions {
        if let Err(e) = session.close() {
            warn!(target: "isolab::coordinator", error = %e, "Close failed");
        }
    }
}
