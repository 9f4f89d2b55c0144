use std::time::Duration;

use census_core::CensusError;

/// Errors raised at the proof boundary.
#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    #[error("malformed proof: {0}")]
    Malformed(String),

    #[error("verifier timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("verifier backend error: {0}")]
    Backend(String),
}

impl From<ProofError> for CensusError {
    fn from(err: ProofError) -> Self {
        match err {
            ProofError::Malformed(msg) => CensusError::InvalidProof(msg),
            ProofError::Timeout(after) => CensusError::VerifierTimeout(after),
            ProofError::Backend(msg) => CensusError::Internal(format!("proof verifier: {}", msg)),
        }
    }
}
