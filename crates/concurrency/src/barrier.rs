//! Named rendezvous with timeout
//!
//! Unlike `std::sync::Barrier`, a waiter gives up after a timeout, and a
//! barrier can be broken (the scenario is cancelled) or abandoned (a
//! participant failed and will never arrive). Both wake every waiter.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Result of [`Barrier::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierWait {
    /// Every participant arrived
    Released,
    /// The timeout elapsed first; the barrier is now broken
    TimedOut {
        /// Participants that had arrived
        arrived: usize,
        /// Participants expected
        expected: usize,
    },
    /// The barrier was broken by a cancellation
    Broken,
    /// A participant will never arrive
    Abandoned {
        /// Session that gave up
        by: String,
    },
}

#[derive(Debug, Default)]
struct State {
    arrived: usize,
    released: bool,
    broken: bool,
    abandoned_by: Option<String>,
}

/// Condvar + counter barrier for a fixed number of participants.
#[derive(Debug)]
pub struct Barrier {
    name: String,
    participants: usize,
    state: Mutex<State>,
    cond: Condvar,
}

impl Barrier {
    /// Barrier `name` releasing once `participants` sessions have arrived.
    pub fn new(name: impl Into<String>, participants: usize) -> Self {
        Self {
            name: name.into(),
            participants,
            state: Mutex::new(State::default()),
            cond: Condvar::new(),
        }
    }

    /// Barrier name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of participants.
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Sessions that have arrived so far.
    pub fn arrived(&self) -> usize {
        self.state.lock().arrived
    }

    /// Arrive and wait for the other participants, at most `timeout`.
    ///
    /// A timeout breaks the barrier for everyone still waiting.
    pub fn wait(&self, timeout: Duration) -> BarrierWait {
        let mut state = self.state.lock();
        if let Some(outcome) = Self::terminal(&state) {
            return outcome;
        }
        state.arrived += 1;
        if state.arrived >= self.participants {
            state.released = true;
            self.cond.notify_all();
            return BarrierWait::Released;
        }

        let deadline = Instant::now() + timeout;
        loop {
            if state.released {
                return BarrierWait::Released;
            }
            if let Some(outcome) = Self::terminal(&state) {
                return outcome;
            }
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                if state.released {
                    return BarrierWait::Released;
                }
                if let Some(outcome) = Self::terminal(&state) {
                    return outcome;
                }
                state.broken = true;
                self.cond.notify_all();
                return BarrierWait::TimedOut {
                    arrived: state.arrived,
                    expected: self.participants,
                };
            }
        }
    }

    fn terminal(state: &State) -> Option<BarrierWait> {
        if state.broken {
            Some(BarrierWait::Broken)
        } else {
            state
                .abandoned_by
                .as_ref()
                .map(|by| BarrierWait::Abandoned { by: by.clone() })
        }
    }

    /// Wake every waiter with [`BarrierWait::Broken`]. No effect once released.
    pub fn break_barrier(&self) {
        let mut state = self.state.lock();
        if !state.released && !state.broken {
            state.broken = true;
            self.cond.notify_all();
        }
    }

    /// Record that `by` will never arrive. No effect once released or broken.
    pub fn abandon(&self, by: &str) {
        let mut state = self.state.lock();
        if !state.released && !state.broken && state.abandoned_by.is_none() {
            state.abandoned_by = Some(by.to_string());
            self.cond.notify_all();
        }
    }
}
