//! Isolation controller
//!
//! Maps a requested level to the level the engine will actually run. Never
//! downgrades: an `Unsupported` entry is an error, and a `Strengthened` entry
//! is an error too unless strengthening is allowed.

use isolab_core::{Capabilities, Engine, Error, IsolationLevel, Result, Support};

/// Resolves requested isolation levels for one engine.
#[derive(Debug, Clone, Copy)]
pub struct IsolationController {
    engine: Engine,
    allow_strengthened: bool,
}

impl IsolationController {
    /// Controller for `engine`.
    pub fn new(engine: Engine, allow_strengthened: bool) -> Self {
        Self {
            engine,
            allow_strengthened,
        }
    }

    /// Engine this controller resolves for.
    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Whether strengthened levels are accepted.
    pub fn allows_strengthened(&self) -> bool {
        self.allow_strengthened
    }

    /// Capability row consulted by [`IsolationController::resolve`].
    pub fn capabilities(&self) -> &'static Capabilities {
        self.engine.capabilities()
    }

    /// Level the engine will run for `level`.
    ///
    /// # Errors
    ///
    /// `UnsupportedIsolation` if the engine cannot run `level`, or only runs
    /// a stronger level and strengthening is disabled.
    pub fn resolve(&self, level: IsolationLevel) -> Result<IsolationLevel> {
        match self.capabilities().support(level) {
            Support::Native => Ok(level),
            Support::Strengthened(actual) if self.allow_strengthened => Ok(actual),
            Support::Strengthened(actual) => Err(Error::UnsupportedIsolation {
                level,
                engine: self.engine,
                reason: format!("engine only runs it as {} and strengthening is disabled", actual),
            }),
            Support::Unsupported => Err(Error::UnsupportedIsolation {
                level,
                engine: self.engine,
                reason: "no equivalent level".to_string(),
            }),
        }
    }
}
