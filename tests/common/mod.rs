//! Shared test utilities for all integration test suites.
//!
//! Import via `mod common;` from any test's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

pub use isolab::{
    catalog, AccountId, Coordinator, Engine, Error, Fixture, IsolationLevel, Query, Scenario,
    ScenarioResult, SchemaProvisioner, SessionFactory, SqliteSessionFactory, Step, Verdict, Write,
};
use tempfile::TempDir;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness when `RUST_LOG` is set.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        if std::env::var_os("RUST_LOG").is_some() {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        }
    });
}

// ============================================================================
// TestDb - migrated SQLite database in a temp directory
// ============================================================================

/// Fresh, migrated SQLite database seeded with the default fixture.
pub struct TestDb {
    pub factory: Arc<dyn SessionFactory>,
    pub provisioner: SchemaProvisioner,
    pub fixture: Fixture,
    _dir: TempDir,
}

impl TestDb {
    /// New database with strengthening allowed.
    pub fn new() -> Self {
        Self::with_strengthening(true)
    }

    /// New database; `allow_strengthened` controls RC/RR on SQLite.
    pub fn with_strengthening(allow_strengthened: bool) -> Self {
        init_tracing();
        let dir = TempDir::new().expect("temp dir");
        let factory: Arc<dyn SessionFactory> = Arc::new(
            SqliteSessionFactory::new(
                dir.path().join("isolab.db"),
                Duration::from_secs(2),
                allow_strengthened,
            )
            .expect("sqlite factory"),
        );
        let provisioner = SchemaProvisioner::new(factory.clone());
        provisioner.migrate().expect("migrate");
        let fixture = Fixture::default();
        fixture.seed(factory.as_ref()).expect("seed");
        Self {
            factory,
            provisioner,
            fixture,
            _dir: dir,
        }
    }

    /// Coordinator over this database.
    pub fn coordinator(&self) -> Coordinator {
        Coordinator::new(self.factory.clone())
    }

    /// Restore the fixture rows.
    pub fn reseed(&self) {
        self.fixture.seed(self.factory.as_ref()).expect("reseed");
    }

    /// Committed balance read in a fresh serializable session.
    pub fn committed_balance(&self, account: AccountId) -> Option<i64> {
        let mut session = self
            .factory
            .open(IsolationLevel::Serializable)
            .expect("open");
        let value = session.read(&Query::Balance(account)).expect("read");
        session.commit().expect("commit");
        value
    }

    /// Short timeouts so hang tests finish quickly.
    pub fn quick(&self, builder: isolab::ScenarioBuilder) -> Scenario {
        builder
            .barrier_timeout(Duration::from_millis(250))
            .deadline(Duration::from_secs(10))
            .build()
            .expect("valid scenario")
    }
}

// ============================================================================
// Concurrency helpers
// ============================================================================

/// Run `transfer` 25 times on each of 4 threads; returns the failures.
pub fn hammer(transfer: impl Fn() -> Result<(), Error> + Sync) -> Vec<Error> {
    thread::scope(|s| {
        let workers: Vec<_> = (0..4)
            .map(|_| s.spawn(|| (0..25).filter_map(|_| transfer().err()).collect::<Vec<_>>()))
            .collect();
        workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect()
    })
}
