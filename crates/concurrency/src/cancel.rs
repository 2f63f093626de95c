//! Scenario-wide cancellation token

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Set once; every `sleep` in progress wakes up when it is.
#[derive(Debug, Default)]
pub struct CancelToken {
    reason: Mutex<Option<String>>,
    cond: Condvar,
}

impl CancelToken {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel with `reason`. Returns false if already cancelled; the first
    /// reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let mut slot = self.reason.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(reason.into());
        self.cond.notify_all();
        true
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        self.reason.lock().is_some()
    }

    /// Reason given to the first `cancel`.
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// Sleep for `duration` unless cancelled first. Returns true if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut slot = self.reason.lock();
        while slot.is_none() {
            if self.cond.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        slot.is_some()
    }
}
