use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use census_core::{Census, CensusError, CensusId, NullifierHash, PublicationPolicy};
use census_ledger::{NullifierLedger, SnapshotStore};

use crate::accumulators::AccumulatorSet;
use crate::reconciler::WorkerHandle;
use crate::registry::CensusRegistry;

/// Snapshot document published next to a root. Anyone holding it can
/// recompute the root: leaf = BLAKE3(0x00 || nullifier), node =
/// BLAKE3(0x01 || left || right), right-padded with zero subtrees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafSnapshot {
    pub census_id: CensusId,
    pub leaf_count: u64,
    pub root: String,
    /// Nullifiers in leaf order.
    pub nullifiers: Vec<NullifierHash>,
    pub published_at: i64,
}

/// Writes accumulator roots back to census records when they are due.
#[derive(Clone)]
pub struct RootPublisher {
    registry: Arc<CensusRegistry>,
    ledger: Arc<dyn NullifierLedger>,
    accumulators: Arc<AccumulatorSet>,
    snapshots: Arc<dyn SnapshotStore>,
    policy: PublicationPolicy,
}

impl RootPublisher {
    pub fn new(
        registry: Arc<CensusRegistry>,
        ledger: Arc<dyn NullifierLedger>,
        accumulators: Arc<AccumulatorSet>,
        snapshots: Arc<dyn SnapshotStore>,
        policy: PublicationPolicy,
    ) -> Self {
        Self {
            registry,
            ledger,
            accumulators,
            snapshots,
            policy,
        }
    }

    /// Whether the census has unpublished leaves old or numerous enough.
    pub async fn is_due(&self, census: &Census) -> Result<bool, CensusError> {
        if !census.is_active() {
            return Ok(false);
        }
        let unpublished = self
            .ledger
            .entries_from(&census.id, census.published_leaf_count)
            .await?;
        let Some(oldest) = unpublished.first() else {
            return Ok(false);
        };
        let age = (Utc::now() - oldest.timestamp)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Ok(self.policy.is_due(unpublished.len() as u64, age))
    }

    /// Snapshot the current leaf set and publish its root.
    pub async fn publish(&self, census_id: &CensusId) -> Result<Census, CensusError> {
        let tree = self
            .accumulators
            .acquire(census_id, self.ledger.as_ref())
            .await?;
        tree.ensure_healthy()?;
        self.registry.get(census_id)?.ensure_active()?;

        let leaf_count = tree.len();
        let root = tree.root();
        let nullifiers: Vec<NullifierHash> = self
            .ledger
            .entries_from(census_id, 0)
            .await?
            .into_iter()
            .take(leaf_count as usize)
            .map(|e| e.nullifier_hash)
            .collect();

        let snapshot = LeafSnapshot {
            census_id: census_id.clone(),
            leaf_count,
            root: hex::encode(root),
            nullifiers,
            published_at: Utc::now().timestamp(),
        };
        let document = serde_json::to_vec(&snapshot)
            .map_err(|e| CensusError::Internal(format!("snapshot encoding: {}", e)))?;
        let reference = self.snapshots.put(&document).await?;

        self.registry
            .publish_root(census_id, root, Some(reference), Some(leaf_count))
            .await
    }

    /// Publish every active census that is due.
    pub async fn publish_due(&self) -> Vec<(CensusId, Result<Census, CensusError>)> {
        let mut results = Vec::new();
        for census in self.registry.list() {
            match self.is_due(&census).await {
                Ok(true) => {
                    let result = self.publish(&census.id).await;
                    results.push((census.id, result));
                }
                Ok(false) => {}
                Err(e) => results.push((census.id, Err(e))),
            }
        }
        results
    }

    /// Check every `interval` and publish what is due, until shut down.
    pub fn start(self, interval: Duration) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        tracing::info!(
            interval_secs = interval.as_secs(),
            max_pending = self.policy.max_pending_registrations,
            max_staleness_secs = self.policy.max_staleness_secs,
            "root publisher started"
        );

        let worker = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for (census_id, result) in self.publish_due().await {
                            if let Err(e) = result {
                                tracing::warn!(census_id = %census_id, error = %e, "root publication failed");
                            }
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
