//! Session factories
//!
//! A factory owns the endpoint details and hands out independent sessions,
//! one physical connection each. No pooling: sessions are cheap enough for a
//! test harness and a pool would hide which connection ran what.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use isolab_core::{Engine, HarnessConfig, IsolationLevel, Result, SessionId};

use crate::controller::IsolationController;
use crate::session::Session;
use crate::sqlite::SqliteSessionFactory;

/// Opens sessions against one endpoint.
pub trait SessionFactory: Send + Sync {
    /// Engine behind the endpoint.
    fn engine(&self) -> Engine;

    /// Controller used to resolve requested levels.
    fn controller(&self) -> IsolationController;

    /// Open a session named `name` pinned to `level`.
    ///
    /// # Errors
    ///
    /// `Connection` if the endpoint is unreachable or exhausted;
    /// `UnsupportedIsolation` if the level does not resolve.
    fn open_named(&self, name: &str, level: IsolationLevel) -> Result<Session>;

    /// Open an anonymous session pinned to `level`.
    fn open(&self, level: IsolationLevel) -> Result<Session> {
        self.open_named("session", level)
    }
}

/// Monotonic session id allocator shared by a factory's sessions.
#[derive(Debug, Default)]
pub(crate) struct SessionIds(AtomicU32);

impl SessionIds {
    pub(crate) fn next(&self) -> SessionId {
        SessionId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Build the factory selected by `config`.
///
/// # Errors
///
/// `Config` for an unknown engine, or for `"mysql"` when the binary was built
/// without the `mysql` feature; `Connection` if the endpoint cannot be
/// prepared.
pub fn open_factory(config: &HarnessConfig) -> Result<Arc<dyn SessionFactory>> {
    match config.engine()? {
        Engine::Sqlite => Ok(Arc::new(SqliteSessionFactory::from_config(config)?)),
        Engine::MySql => open_mysql(config),
    }
}

#[cfg(feature = "mysql")]
fn open_mysql(config: &HarnessConfig) -> Result<Arc<dyn SessionFactory>> {
    Ok(Arc::new(crate::mysql::MySqlSessionFactory::from_config(config)?))
}

#[cfg(not(feature = "mysql"))]
fn open_mysql(_config: &HarnessConfig) -> Result<Arc<dyn SessionFactory>> {
    Err(isolab_core::Error::Config {
        reason: "engine \"mysql\" requires building with the \"mysql\" feature".to_string(),
    })
}
