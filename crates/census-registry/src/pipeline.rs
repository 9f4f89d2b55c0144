//! Proof submission pipeline.
//!
//! Order of a submission:
//! 1. structural validation of the submission (no I/O)
//! 2. census lookup, `Active` and minimum-age checks
//! 3. proof verification, bounded by the verifier timeout
//! 4. under the census commit lock: re-check `Active`, atomic ledger insert
//! 5. tree append, verified record, counters, projection
//!
//! Everything before the ledger insert is side-effect free. Steps 4 and 5 run
//! in a detached task: once the ledger accepts, the registration completes
//! even if the caller goes away. Step 5 is replayed from the ledger entry by
//! [`RegistrationPipeline::complete_outstanding`], which the reconciler also
//! uses.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use census_core::{
    CensusError, CensusId, NullifierHash, PipelineConfig, RegistrationRecord, RegistrationStatus,
};
use census_ledger::{InsertOutcome, NullifierLedger, RegistrationStore};
use census_proof::{ProofSubmission, ProofVerifier, ValidatedSubmission};

use crate::accumulators::{AccumulatorSet, CensusTree};
use crate::projection::StatsProjection;
use crate::registry::CensusRegistry;

/// Answer to an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub accepted: bool,
    pub census_id: CensusId,
    pub nullifier_hash: NullifierHash,
    /// Leaf position assigned by the ledger.
    pub index: u64,
    /// Accumulator root after the append; absent while completion is pending.
    pub root: Option<String>,
    /// `verified` once counters reflect the registration, otherwise `pending`.
    pub status: RegistrationStatus,
}

/// What one completion pass applied for a census.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionReport {
    pub leaves_appended: u64,
    pub members_counted: u64,
}

/// Orchestrates verifier, ledger, accumulator and registry for submissions.
#[derive(Clone)]
pub struct RegistrationPipeline {
    registry: Arc<CensusRegistry>,
    ledger: Arc<dyn NullifierLedger>,
    records: Arc<dyn RegistrationStore>,
    accumulators: Arc<AccumulatorSet>,
    projection: Arc<StatsProjection>,
    verifier: Arc<dyn ProofVerifier>,
    config: PipelineConfig,
}

impl RegistrationPipeline {
    pub fn new(
        registry: Arc<CensusRegistry>,
        ledger: Arc<dyn NullifierLedger>,
        records: Arc<dyn RegistrationStore>,
        accumulators: Arc<AccumulatorSet>,
        projection: Arc<StatsProjection>,
        verifier: Arc<dyn ProofVerifier>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            ledger,
            records,
            accumulators,
            projection,
            verifier,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run steps 1 and 3 only: validation and verification, no census checks
    /// and no side effects. The census named in the public signals is used.
    pub async fn verify_only(&self, submission: &ProofSubmission) -> Result<bool, CensusError> {
        let validated = submission.validate(Utc::now(), &self.config)?;
        let ok = self
            .verifier
            .verify(&validated.proof, &validated.signals, &validated.census_id)
            .await?;
        Ok(ok)
    }

    /// Register one proof submission.
    pub async fn submit(
        &self,
        submission: &ProofSubmission,
    ) -> Result<SubmissionReceipt, CensusError> {
        let validated = submission.validate(Utc::now(), &self.config)?;
        let census_id = validated.census_id.clone();

        let census = self.registry.get(&census_id)?;
        census.ensure_active()?;
        if validated.signals.age_range < census.min_age {
            return Err(CensusError::AgeRequirementNotMet {
                required: census.min_age,
                actual: validated.signals.age_range,
            });
        }

        let verified = self
            .verifier
            .verify(&validated.proof, &validated.signals, &census_id)
            .await?;
        if !verified {
            tracing::info!(
                census_id = %census_id,
                verifier = self.verifier.verifier_id(),
                "proof rejected by verifier"
            );
            return Err(CensusError::ProofVerification(format!(
                "proof does not verify for census {}",
                census_id
            )));
        }

        let this = self.clone();
        let commit = tokio::spawn(async move { this.commit(validated).await });
        match commit.await {
            Ok(result) => result,
            Err(e) => Err(CensusError::Internal(format!("commit task failed: {}", e))),
        }
    }

    async fn commit(&self, validated: ValidatedSubmission) -> Result<SubmissionReceipt, CensusError> {
        let census_id = validated.census_id;
        let signals = validated.signals;

        let mut tree = self
            .accumulators
            .acquire(&census_id, self.ledger.as_ref())
            .await?;
        tree.ensure_healthy()?;
        self.registry.get(&census_id)?.ensure_active()?;

        let insert = self.ledger.try_register(
            &census_id,
            &signals.nullifier_hash,
            signals.age_range,
            signals.continent,
        );
        let outcome = tokio::time::timeout(self.config.ledger_timeout(), insert)
            .await
            .map_err(|_| {
                CensusError::TransientStorage(format!(
                    "ledger write timed out after {}ms",
                    self.config.ledger_timeout_ms
                ))
            })??;

        let entry = match outcome {
            InsertOutcome::Accepted(entry) => entry,
            InsertOutcome::Duplicate { existing_index } => {
                let rejected = RegistrationRecord {
                    id: uuid::Uuid::now_v7(),
                    census_id: census_id.clone(),
                    nullifier_hash: signals.nullifier_hash,
                    age_range: signals.age_range,
                    continent: signals.continent,
                    timestamp: signals.timestamp.timestamp(),
                    external_tx_ref: format!("ledger:{}:{}", census_id, existing_index),
                    status: RegistrationStatus::Rejected,
                };
                if let Err(e) = self.records.put(rejected).await {
                    tracing::warn!(census_id = %census_id, error = %e, "failed to record rejected registration");
                }
                tracing::info!(
                    census_id = %census_id,
                    nullifier = %signals.nullifier_hash,
                    "duplicate nullifier rejected"
                );
                return Err(CensusError::DuplicateNullifier {
                    census_id: census_id.to_string(),
                    nullifier: signals.nullifier_hash.to_hex(),
                });
            }
        };

        tracing::info!(census_id = %census_id, index = entry.index, "nullifier accepted");

        if let Err(e) = self
            .records
            .put(RegistrationRecord::from_entry(&entry, RegistrationStatus::Pending))
            .await
        {
            tracing::warn!(census_id = %census_id, index = entry.index, error = %e, "pending record not written");
        }

        let mut receipt = SubmissionReceipt {
            accepted: true,
            census_id: census_id.clone(),
            nullifier_hash: entry.nullifier_hash,
            index: entry.index,
            root: None,
            status: RegistrationStatus::Pending,
        };

        match self.complete_outstanding(&mut tree).await {
            Ok(_) => {
                receipt.root = Some(hex::encode(tree.root()));
                if self.registry.get(&census_id)?.total_members > entry.index {
                    receipt.status = RegistrationStatus::Verified;
                }
            }
            Err(e) => {
                tracing::warn!(
                    census_id = %census_id,
                    index = entry.index,
                    error = %e,
                    retryable = e.is_retryable(),
                    "registration accepted, completion deferred to reconciliation"
                );
            }
        }
        Ok(receipt)
    }

    /// Apply steps 5 and 6 for every ledger entry of the census that is not
    /// yet reflected in the tree or the counters. Requires the commit lock.
    ///
    /// Watermarks: the tree length for appends, `total_members` for counters.
    /// The verified record is written before the counter moves, so every entry
    /// below the counter watermark already has its record.
    pub async fn complete_outstanding(
        &self,
        tree: &mut CensusTree,
    ) -> Result<CompletionReport, CensusError> {
        let census_id = tree.census_id().clone();
        tree.sync_from(self.ledger.as_ref()).await?;
        let leaves_appended = tree.take_appended();

        let census = self.registry.get(&census_id)?;
        let outstanding = self
            .ledger
            .entries_from(&census_id, census.total_members)
            .await?;

        let mut members_counted = 0;
        for entry in &outstanding {
            if entry.index >= tree.len() {
                return Err(tree.halt(format!(
                    "ledger entry {} is not in the accumulator",
                    entry.index
                )));
            }
            self.records
                .put(RegistrationRecord::from_entry(entry, RegistrationStatus::Verified))
                .await?;
            let census = self
                .registry
                .record_member(&census_id, entry.age_range, entry.continent)
                .await?;
            if let Err(e) = census.check_invariants() {
                tracing::error!(alert = true, census_id = %census_id, error = %e, "counter invariant violated");
                return Err(e);
            }
            self.projection.refresh(&census);
            members_counted += 1;
        }

        if members_counted > 0 || leaves_appended > 0 {
            tracing::debug!(
                census_id = %census_id,
                leaves_appended,
                members_counted,
                root = %hex::encode(tree.root()),
                "registrations completed"
            );
        }
        Ok(CompletionReport {
            leaves_appended,
            members_counted,
        })
    }
}
