//! Per-session executor
//!
//! Runs one session script on its own thread. Whatever happens, the executor
//! rolls back an open transaction and closes its session before reporting.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use isolab_core::{Error, HangCause, Result};
use isolab_session::{InterruptHandle, Session};

use crate::barrier::{Barrier, BarrierWait};
use crate::cancel::CancelToken;
use crate::result::{ObservedValue, SessionOutcome, SessionStatus};
use crate::scenario::{Scenario, SessionScript, Step};

/// Shared state of one scenario run.
pub(crate) struct RunControl {
    scenario: String,
    barriers: HashMap<String, Barrier>,
    interrupts: Vec<InterruptHandle>,
    barrier_timeout: Duration,
    token: CancelToken,
    hang: Mutex<Option<HangCause>>,
}

impl RunControl {
    pub(crate) fn new(scenario: &Scenario, interrupts: Vec<InterruptHandle>) -> Self {
        Self {
            scenario: scenario.name().to_string(),
            barriers: scenario
                .barriers()
                .iter()
                .map(|(name, n)| (name.clone(), Barrier::new(name.clone(), *n)))
                .collect(),
            interrupts,
            barrier_timeout: scenario.barrier_timeout(),
            token: CancelToken::new(),
            hang: Mutex::new(None),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the run: break every barrier and interrupt every session.
    pub(crate) fn cancel(&self, reason: String) {
        if self.token.cancel(reason.clone()) {
            warn!(target: "isolab::coordinator", scenario = %self.scenario, reason = %reason, "Cancelling scenario");
            for barrier in self.barriers.values() {
                barrier.break_barrier();
            }
            for handle in &self.interrupts {
                handle.interrupt();
            }
        }
    }

    /// Record a hang (the first one wins) and cancel.
    pub(crate) fn abort(&self, cause: HangCause) {
        let reason = cause.to_string();
        {
            let mut slot = self.hang.lock();
            if slot.is_none() {
                *slot = Some(cause);
            }
        }
        self.cancel(reason);
    }

    pub(crate) fn hang(&self) -> Option<HangCause> {
        self.hang.lock().clone()
    }

    fn cancel_reason(&self) -> String {
        self.token
            .reason()
            .unwrap_or_else(|| "scenario cancelled".to_string())
    }
}

/// What an executor hands back to the coordinator.
pub(crate) struct ExecutorReport {
    pub(crate) outcome: SessionOutcome,
    pub(crate) observations: Vec<ObservedValue>,
}

enum Flow {
    Continue,
    Stop(SessionStatus),
}

/// Drive `session` through `script`.
pub(crate) fn run_session(
    index: usize,
    script: &SessionScript,
    mut session: Session,
    control: &RunControl,
) -> ExecutorReport {
    let mut observations = Vec::new();
    let mut status = SessionStatus::Completed;
    let mut steps_completed = 0;

    for (step_no, step) in script.steps.iter().enumerate() {
        if control.is_cancelled() {
            status = SessionStatus::Cancelled {
                step: step_no,
                reason: control.cancel_reason(),
            };
            break;
        }
        match run_step(index, step_no, step, script, &mut session, control, &mut observations) {
            Ok(Flow::Continue) => steps_completed += 1,
            Ok(Flow::Stop(stopped)) => {
                status = stopped;
                break;
            }
            Err(e) if control.is_cancelled() => {
                debug!(target: "isolab::coordinator", session = %script.name, step = step_no, error = %e, "Step interrupted");
                status = SessionStatus::Cancelled {
                    step: step_no,
                    reason: control.cancel_reason(),
                };
                break;
            }
            Err(e) => {
                warn!(target: "isolab::coordinator", scenario = %control.scenario, session = %script.name, step = step_no, error = %e, "Step failed");
                status = SessionStatus::Failed {
                    step: step_no,
                    error: e.to_string(),
                };
                break;
            }
        }
    }

    if !status.is_completed() {
        // Peers must not wait for barriers this session will never reach.
        let stopped_at = steps_completed;
        for (i, name) in script.barriers() {
            if i >= stopped_at {
                if let Some(barrier) = control.barriers.get(name) {
                    barrier.abandon(&script.name);
                }
            }
        }
    }

    let final_state = session.state();
    if final_state.is_active() {
        if let Err(e) = session.rollback() {
            warn!(target: "isolab::coordinator", session = %script.name, error = %e, "Rollback during cleanup failed");
        }
    }
    let requested = session.requested_level();
    let effective = session.effective_level();
    if let Err(e) = session.close() {
        warn!(target: "isolab::coordinator", session = %script.name, error = %e, "Close failed");
    }

    ExecutorReport {
        outcome: SessionOutcome {
            name: script.name.clone(),
            index,
            requested,
            effective,
            status,
            steps_completed,
            final_state,
        },
        observations,
    }
}

#[allow(clippy::too_many_arguments)]
fn run_step(
    index: usize,
    step_no: usize,
    step: &Step,
    script: &SessionScript,
    session: &mut Session,
    control: &RunControl,
    observations: &mut Vec<ObservedValue>,
) -> Result<Flow> {
    debug!(target: "isolab::coordinator", session = %script.name, step = step_no, ?step, "Step");
    match step {
        Step::Begin => session.begin()?,
        Step::BeginReadOnly => session.begin_read_only()?,
        Step::Write(write) => {
            session.write(write)?;
        }
        Step::Read { label, query } => {
            let value = session.read(query)?;
            debug!(target: "isolab::coordinator", session = %script.name, label = %label, ?value, "Observed");
            observations.push(ObservedValue {
                session: script.name.clone(),
                session_index: index,
                step: step_no,
                label: label.clone(),
                value,
            });
        }
        Step::Barrier(name) => {
            let barrier = control
                .barriers
                .get(name)
                .ok_or_else(|| Error::invalid_state(format!("unknown barrier '{}'", name)))?;
            match barrier.wait(control.barrier_timeout) {
                BarrierWait::Released => {}
                BarrierWait::TimedOut { arrived, expected } => {
                    control.abort(HangCause::Barrier {
                        name: name.clone(),
                        arrived,
                        expected,
                        timeout: control.barrier_timeout,
                    });
                    return Ok(Flow::Stop(SessionStatus::Cancelled {
                        step: step_no,
                        reason: format!("barrier '{}' timed out", name),
                    }));
                }
                BarrierWait::Broken => {
                    return Ok(Flow::Stop(SessionStatus::Cancelled {
                        step: step_no,
                        reason: control.cancel_reason(),
                    }));
                }
                BarrierWait::Abandoned { by } => {
                    return Ok(Flow::Stop(SessionStatus::Cancelled {
                        step: step_no,
                        reason: format!("barrier '{}' abandoned by '{}'", name, by),
                    }));
                }
            }
        }
        Step::Pause(duration) => {
            if control.token.sleep(*duration) {
                return Ok(Flow::Stop(SessionStatus::Cancelled {
                    step: step_no,
                    reason: control.cancel_reason(),
                }));
            }
        }
        Step::Commit => session.commit()?,
        Step::Rollback => session.rollback()?,
    }
    Ok(Flow::Continue)
}
