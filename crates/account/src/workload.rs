//! Concurrent transfer workload
//!
//! Worker threads move money between a fixed set of accounts while a sampler
//! reads the total balance. Transfers never change the total, so every
//! sample taken at READ COMMITTED or stricter equals the starting total. At
//! READ UNCOMMITTED a sample can land between a debit and its credit; a
//! `hold` between the two widens that window.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use isolab_core::{AccountId, Error, Result};

use crate::dao::AccountDao;

/// Shape of a transfer run.
#[derive(Debug, Clone)]
pub struct TransferWorkload {
    accounts: Vec<AccountId>,
    workers: usize,
    transfers_per_worker: usize,
    amount: i64,
    hold: Duration,
    samples: usize,
    sample_interval: Duration,
}

/// What a transfer run observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadReport {
    /// Committed total before any transfer
    pub expected_total: i64,
    /// Totals read by the sampler, in order
    pub samples: Vec<i64>,
    /// Transfers that committed
    pub committed: u64,
    /// Transfers that failed and rolled back
    pub failed: u64,
}

impl WorkloadReport {
    /// Samples that differ from the expected total.
    pub fn inconsistent_samples(&self) -> usize {
        self.samples
            .iter()
            .filter(|s| **s != self.expected_total)
            .count()
    }

    /// True if every sample saw the expected total.
    pub fn is_consistent(&self) -> bool {
        self.inconsistent_samples() == 0
    }
}

impl TransferWorkload {
    /// Workload over `accounts` with 4 workers, 25 transfers each, amount 10
    /// and 20 samples.
    pub fn new(accounts: Vec<AccountId>) -> Self {
        Self {
            accounts,
            workers: 4,
            transfers_per_worker: 25,
            amount: 10,
            hold: Duration::ZERO,
            samples: 20,
            sample_interval: Duration::from_millis(1),
        }
    }

    /// Number of transfer threads
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Transfers each worker runs
    pub fn transfers_per_worker(mut self, transfers: usize) -> Self {
        self.transfers_per_worker = transfers;
        self
    }

    /// Amount moved per transfer
    pub fn amount(mut self, amount: i64) -> Self {
        self.amount = amount;
        self
    }

    /// Pause between each debit and its credit, inside the transaction
    pub fn hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    /// Total samples and the pause between them
    pub fn samples(mut self, samples: usize, interval: Duration) -> Self {
        self.samples = samples;
        self.sample_interval = interval;
        self
    }

    /// Run transfers through `writer` while sampling totals through `reader`.
    ///
    /// Failed transfers are counted, not fatal.
    ///
    /// # Errors
    ///
    /// `InvalidState` for fewer than two accounts or no workers; any error
    /// from reading the starting total or from a sample.
    pub fn run(&self, writer: &AccountDao, reader: &AccountDao) -> Result<WorkloadReport> {
        if self.accounts.len() < 2 {
            return Err(Error::invalid_state("transfer workload needs two accounts"));
        }
        if self.workers == 0 {
            return Err(Error::invalid_state("transfer workload needs a worker"));
        }

        let expected_total = reader.total_balances()?;
        let committed = AtomicU64::new(0);
        let failed = AtomicU64::new(0);
        info!(
            target: "isolab::account",
            workers = self.workers,
            transfers = self.transfers_per_worker,
            writer_level = %writer.level(),
            reader_level = %reader.level(),
            expected_total,
            "Transfer workload started"
        );

        let samples = thread::scope(|scope| {
            for worker in 0..self.workers {
                let committed = &committed;
                let failed = &failed;
                scope.spawn(move || {
                    for i in 0..self.transfers_per_worker {
                        let (from, to) = self.pair(worker + i);
                        match writer.transfer(from, to, self.amount, self.hold) {
                            Ok(()) => {
                                committed.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => {
                                debug!(target: "isolab::account", worker, %from, %to, error = %e, "Transfer failed");
                                failed.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                });
            }

            let mut samples = Vec::with_capacity(self.samples);
            for _ in 0..self.samples {
                samples.push(reader.total_balances()?);
                thread::sleep(self.sample_interval);
            }
            Ok::<_, Error>(samples)
        })?;

        let report = WorkloadReport {
            expected_total,
            samples,
            committed: committed.into_inner(),
            failed: failed.into_inner(),
        };
        if report.is_consistent() {
            info!(target: "isolab::account", committed = report.committed, failed = report.failed, "Transfer workload finished");
        } else {
            warn!(
                target: "isolab::account",
                inconsistent = report.inconsistent_samples(),
                samples = report.samples.len(),
                "Sampler saw totals that never existed"
            );
        }
        Ok(report)
    }

    fn pair(&self, n: usize) -> (AccountId, AccountId) {
        let len = self.accounts.len();
        (self.accounts[n % len], self.accounts[(n + 1) % len])
    }
}
