use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use census_core::{CensusError, CensusId, PipelineConfig};
use census_crypto::{submission_message, PublicKey, Signature};

use crate::groth16::{Groth16Proof, PublicSignals, RawProof, RawPublicSignals};

/// A registration request as sent by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofSubmission {
    pub census_id: String,
    pub proof: RawProof,
    pub public_signals: RawPublicSignals,
    /// Ed25519 signature over the canonical submission message (hex or base58).
    pub signature: String,
    /// Base58 Ed25519 public key of the submitting device.
    pub public_key: String,
}

/// Output of boundary validation. Downstream code never re-checks shapes.
#[derive(Debug, Clone)]
pub struct ValidatedSubmission {
    pub census_id: CensusId,
    pub proof: Groth16Proof,
    pub signals: PublicSignals,
}

impl ProofSubmission {
    /// Structural validation. Side-effect free; safe to repeat.
    pub fn validate(
        &self,
        now: DateTime<Utc>,
        config: &PipelineConfig,
    ) -> Result<ValidatedSubmission, CensusError> {
        let census_id = CensusId::new(self.census_id.clone())
            .map_err(|e| CensusError::InvalidProof(format!("censusId: {}", e)))?;
        let proof = self.proof.validate()?;
        let signals = self
            .public_signals
            .validate(now, config.max_clock_skew_secs)?;
        if signals.census_id != census_id {
            return Err(CensusError::InvalidProof(format!(
                "publicSignals.censusId {} does not match censusId {}",
                signals.census_id, census_id
            )));
        }

        if config.verify_signatures {
            self.check_signature(&census_id, &signals)?;
        }

        Ok(ValidatedSubmission {
            census_id,
            proof,
            signals,
        })
    }

    fn check_signature(
        &self,
        census_id: &CensusId,
        signals: &PublicSignals,
    ) -> Result<(), CensusError> {
        let public_key = PublicKey::from_bs58(&self.public_key)
            .map_err(|e| CensusError::InvalidProof(format!("publicKey: {}", e)))?;
        let signature = Signature::decode(&self.signature)
            .map_err(|e| CensusError::InvalidProof(format!("signature: {}", e)))?;
        let message = submission_message(
            census_id.as_str(),
            &signals.nullifier_hash.to_hex(),
            signals.age_range.into(),
            signals.continent.into(),
            signals.timestamp.timestamp(),
        );
        census_crypto::verify(&message, &signature, &public_key).map_err(|_| {
            tracing::debug!(census_id = %census_id, "submission signature mismatch");
            CensusError::InvalidSignature
        })
    }
}
