//! The operations the registration core exposes to its callers.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use census_core::{
    Census, CensusConfig, CensusError, CensusId, CensusStatistics, GlobalStats, NullifierHash,
    PipelineConfig, PublicationPolicy, RegistrationStatus, BUCKET_COUNT,
};
use census_crypto::{close_message, root_message, InclusionProof};
use census_ledger::{
    CensusStore, MemoryCensusStore, MemoryNullifierLedger, MemoryRegistrationStore,
    MemorySnapshotStore, NullifierLedger, RegistrationStore, SnapshotStore,
};
use census_proof::{ProofSubmission, ProofVerifier};

use crate::accumulators::AccumulatorSet;
use crate::pipeline::{RegistrationPipeline, SubmissionReceipt};
use crate::projection::StatsProjection;
use crate::publisher::RootPublisher;
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::registry::CensusRegistry;

/// Backing stores of a service instance.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn NullifierLedger>,
    pub records: Arc<dyn RegistrationStore>,
    pub censuses: Arc<dyn CensusStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            ledger: Arc::new(MemoryNullifierLedger::new()),
            records: Arc::new(MemoryRegistrationStore::new()),
            censuses: Arc::new(MemoryCensusStore::new()),
            snapshots: Arc::new(MemorySnapshotStore::new()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub pipeline: PipelineConfig,
    pub publication: PublicationPolicy,
}

/// Cross-store consistency of one census.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub census_id: CensusId,
    pub total_members: u64,
    pub verified_records: u64,
    pub ledger_entries: u64,
    pub tree_leaves: u64,
    pub accumulator_root: String,
    pub recomputed_root: String,
    pub published_root: String,
    pub published_leaf_count: u64,
    pub projection_matches: bool,
    pub consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub total_censuses: u64,
    pub active_censuses: u64,
    pub halted_censuses: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.halted_censuses.is_empty()
    }
}

/// Facade over registry, pipeline, reconciler and publisher.
pub struct CensusService {
    registry: Arc<CensusRegistry>,
    ledger: Arc<dyn NullifierLedger>,
    records: Arc<dyn RegistrationStore>,
    accumulators: Arc<AccumulatorSet>,
    projection: Arc<StatsProjection>,
    pipeline: RegistrationPipeline,
    reconciler: Reconciler,
    publisher: RootPublisher,
}

impl CensusService {
    /// Load censuses from the stores and wire the components together.
    pub async fn new(
        stores: Stores,
        verifier: Arc<dyn ProofVerifier>,
        config: ServiceConfig,
    ) -> Result<Self, CensusError> {
        let registry = Arc::new(CensusRegistry::load(stores.censuses.clone()).await?);
        let accumulators = Arc::new(AccumulatorSet::new());
        let projection = Arc::new(StatsProjection::new());
        for census in registry.list() {
            projection.refresh(&census);
        }

        let pipeline = RegistrationPipeline::new(
            registry.clone(),
            stores.ledger.clone(),
            stores.records.clone(),
            accumulators.clone(),
            projection.clone(),
            verifier,
            config.pipeline,
        );
        let reconciler = Reconciler::new(
            pipeline.clone(),
            registry.clone(),
            stores.ledger.clone(),
            accumulators.clone(),
        );
        let publisher = RootPublisher::new(
            registry.clone(),
            stores.ledger.clone(),
            accumulators.clone(),
            stores.snapshots.clone(),
            config.publication,
        );

        Ok(Self {
            registry,
            ledger: stores.ledger,
            records: stores.records,
            accumulators,
            projection,
            pipeline,
            reconciler,
            publisher,
        })
    }

    pub fn reconciler(&self) -> Reconciler {
        self.reconciler.clone()
    }

    pub fn publisher(&self) -> RootPublisher {
        self.publisher.clone()
    }

    pub async fn create_census(&self, config: CensusConfig) -> Result<Census, CensusError> {
        let census = self.registry.create(None, config).await?;
        self.projection.refresh(&census);
        Ok(census)
    }

    pub fn get_census(&self, census_id: &CensusId) -> Result<Census, CensusError> {
        self.registry.get(census_id)
    }

    pub fn list_censuses(&self) -> Vec<Census> {
        self.registry.list()
    }

    pub async fn submit_proof(
        &self,
        submission: &ProofSubmission,
    ) -> Result<SubmissionReceipt, CensusError> {
        self.pipeline.submit(submission).await
    }

    /// Validate and verify without registering anything.
    pub async fn verify_proof(&self, submission: &ProofSubmission) -> Result<bool, CensusError> {
        self.pipeline.verify_only(submission).await
    }

    /// Ledger lookup; never answered from a projection.
    pub async fn check_nullifier(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<bool, CensusError> {
        self.registry.get(census_id)?;
        Ok(self.ledger.contains(census_id, nullifier).await?)
    }

    pub fn get_census_stats(&self, census_id: &CensusId) -> Result<CensusStatistics, CensusError> {
        let census = self.registry.get(census_id)?;
        Ok(self
            .projection
            .get(census_id)
            .unwrap_or_else(|| census.statistics()))
    }

    pub fn get_age_distribution(
        &self,
        census_id: &CensusId,
    ) -> Result<[u64; BUCKET_COUNT], CensusError> {
        Ok(self.get_census_stats(census_id)?.age_distribution)
    }

    pub fn get_continent_distribution(
        &self,
        census_id: &CensusId,
    ) -> Result<[u64; BUCKET_COUNT], CensusError> {
        Ok(self.get_census_stats(census_id)?.continent_distribution)
    }

    pub fn get_global_stats(&self) -> GlobalStats {
        self.registry.global_stats()
    }

    /// Close a census. Takes the commit lock so no registration can be
    /// accepted after the close is recorded.
    pub async fn close_census(
        &self,
        census_id: &CensusId,
        signature: Option<&str>,
    ) -> Result<Census, CensusError> {
        let census = self.registry.get(census_id)?;
        self.registry
            .authorize(&census, &close_message(census_id.as_str()), signature)?;

        let _tree = self
            .accumulators
            .acquire(census_id, self.ledger.as_ref())
            .await?;
        let closed = self.registry.close(census_id).await?;
        self.projection.refresh(&closed);
        Ok(closed)
    }

    /// Overwrite the published root of an active census.
    pub async fn update_merkle_root(
        &self,
        census_id: &CensusId,
        root: [u8; 32],
        snapshot_ref: Option<String>,
        signature: Option<&str>,
    ) -> Result<Census, CensusError> {
        let census = self.registry.get(census_id)?;
        census.ensure_active()?;
        let message = root_message(
            census_id.as_str(),
            &hex::encode(root),
            snapshot_ref.as_deref().unwrap_or(""),
        );
        self.registry.authorize(&census, &message, signature)?;

        let tree = self
            .accumulators
            .acquire(census_id, self.ledger.as_ref())
            .await?;
        let leaf_count = (tree.root() == root).then(|| tree.len());
        self.registry
            .publish_root(census_id, root, snapshot_ref, leaf_count)
            .await
    }

    /// Publish the current accumulator root now, with a snapshot.
    pub async fn publish_root(&self, census_id: &CensusId) -> Result<Census, CensusError> {
        self.publisher.publish(census_id).await
    }

    /// Inclusion proof of a registered nullifier against the current root.
    pub async fn get_merkle_proof(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<InclusionProof, CensusError> {
        self.registry.get(census_id)?;
        let entry = self.ledger.get(census_id, nullifier).await?.ok_or_else(|| {
            CensusError::Validation(format!(
                "nullifier {} is not registered in census {}",
                nullifier, census_id
            ))
        })?;
        let tree = self
            .accumulators
            .acquire(census_id, self.ledger.as_ref())
            .await?;
        tree.ensure_healthy()?;
        tree.proof_for(&entry)
    }

    /// Compare counters, records, ledger, tree and projection of one census.
    pub async fn audit(&self, census_id: &CensusId) -> Result<AuditReport, CensusError> {
        let mut tree = self
            .accumulators
            .acquire(census_id, self.ledger.as_ref())
            .await?;
        let census = self.registry.get(census_id)?;
        let entries = self.ledger.entries_from(census_id, 0).await?;
        let records = self.records.list(census_id).await?;

        let nullifiers: Vec<NullifierHash> = entries.iter().map(|e| e.nullifier_hash).collect();
        let recomputed = tree.audit(&nullifiers)?;

        let verified_records = records
            .iter()
            .filter(|r| r.status == RegistrationStatus::Verified)
            .count() as u64;
        let derived = StatsProjection::derive(&census, &records);
        let projection_matches = derived.same_counts(&census.statistics())
            && self
                .projection
                .get(census_id)
                .map(|p| p.same_counts(&derived))
                .unwrap_or(false);

        let ledger_entries = entries.len() as u64;
        let consistent = census.total_members == verified_records
            && verified_records == ledger_entries
            && ledger_entries == tree.len()
            && projection_matches
            && census.check_invariants().is_ok();

        if !consistent {
            tracing::warn!(
                census_id = %census_id,
                total_members = census.total_members,
                verified_records,
                ledger_entries,
                tree_leaves = tree.len(),
                "census audit found drift"
            );
        }

        Ok(AuditReport {
            census_id: census_id.clone(),
            total_members: census.total_members,
            verified_records,
            ledger_entries,
            tree_leaves: tree.len(),
            accumulator_root: hex::encode(tree.root()),
            recomputed_root: hex::encode(recomputed),
            published_root: hex::encode(census.merkle_root),
            published_leaf_count: census.published_leaf_count,
            projection_matches,
            consistent,
        })
    }

    /// Rebuild the statistics view of a census from its verified records.
    pub async fn rebuild_stats(&self, census_id: &CensusId) -> Result<CensusStatistics, CensusError> {
        let census = self.registry.get(census_id)?;
        let records = self.records.list(census_id).await?;
        Ok(self.projection.rebuild(&census, &records))
    }

    pub async fn reconcile(&self) -> ReconcileReport {
        self.reconciler.run_once().await
    }

    pub async fn health(&self) -> HealthReport {
        let stats = self.registry.global_stats();
        HealthReport {
            total_censuses: stats.total_censuses,
            active_censuses: stats.active_censuses,
            halted_censuses: self
                .accumulators
                .halted()
                .await
                .into_iter()
                .map(|(id, _)| id.to_string())
                .collect(),
        }
    }
}
