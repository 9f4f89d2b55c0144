use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use census_core::{CensusError, CensusId};
use census_ledger::NullifierLedger;

use crate::accumulators::AccumulatorSet;
use crate::pipeline::RegistrationPipeline;
use crate::registry::CensusRegistry;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub censuses_checked: u64,
    pub leaves_appended: u64,
    pub members_counted: u64,
    /// Censuses that could not be reconciled, with the error.
    pub failures: Vec<(CensusId, String)>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.leaves_appended == 0 && self.members_counted == 0 && self.failures.is_empty()
    }
}

/// Replays ledger entries that are not yet reflected in trees and counters,
/// then audits each accumulator against the ledger.
#[derive(Clone)]
pub struct Reconciler {
    pipeline: RegistrationPipeline,
    registry: Arc<CensusRegistry>,
    ledger: Arc<dyn NullifierLedger>,
    accumulators: Arc<AccumulatorSet>,
}

impl Reconciler {
    pub fn new(
        pipeline: RegistrationPipeline,
        registry: Arc<CensusRegistry>,
        ledger: Arc<dyn NullifierLedger>,
        accumulators: Arc<AccumulatorSet>,
    ) -> Self {
        Self {
            pipeline,
            registry,
            ledger,
            accumulators,
        }
    }

    /// Reconcile one census. Closed censuses are included: an accepted
    /// registration completes regardless of later lifecycle changes.
    pub async fn reconcile_census(
        &self,
        census_id: &CensusId,
    ) -> Result<(u64, u64), CensusError> {
        let mut tree = self
            .accumulators
            .acquire(census_id, self.ledger.as_ref())
            .await?;
        tree.ensure_healthy()?;
        let report = self.pipeline.complete_outstanding(&mut tree).await?;

        let nullifiers: Vec<_> = self
            .ledger
            .entries_from(census_id, 0)
            .await?
            .into_iter()
            .map(|e| e.nullifier_hash)
            .collect();
        tree.audit(&nullifiers)?;

        if report.leaves_appended > 0 || report.members_counted > 0 {
            tracing::info!(
                census_id = %census_id,
                leaves_appended = report.leaves_appended,
                members_counted = report.members_counted,
                "replayed accepted registrations"
            );
        }
        Ok((report.leaves_appended, report.members_counted))
    }

    /// One pass over every census.
    pub async fn run_once(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for census_id in self.registry.ids() {
            report.censuses_checked += 1;
            match self.reconcile_census(&census_id).await {
                Ok((leaves, members)) => {
                    report.leaves_appended += leaves;
                    report.members_counted += members;
                }
                Err(e) => {
                    tracing::warn!(census_id = %census_id, error = %e, "reconciliation failed");
                    report.failures.push((census_id, e.to_string()));
                }
            }
        }
        report
    }

    /// Run `run_once` every `interval` until shut down.
    pub fn start(self, interval: Duration) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        tracing::info!(interval_secs = interval.as_secs(), "reconciler started");

        let worker = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let started = Instant::now();
                        let report = self.run_once().await;
                        if !report.is_clean() {
                            tracing::info!(
                                censuses = report.censuses_checked,
                                leaves_appended = report.leaves_appended,
                                members_counted = report.members_counted,
                                failures = report.failures.len(),
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "reconciliation pass finished"
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        WorkerHandle::new(shutdown_tx, worker)
    }
}

/// Handle to a background loop; stops it on `shutdown`.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    pub(crate) fn new(shutdown: watch::Sender<bool>, worker: JoinHandle<()>) -> Self {
        Self {
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub async fn shutdown(&self) {
        if self.shutdown.send(true).is_err() {
            return;
        }
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(err) = handle.await {
                tracing::debug!(?err, "background worker exited with error");
            }
        }
    }
}
