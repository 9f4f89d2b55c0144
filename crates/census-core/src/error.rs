use std::time::Duration;

use crate::census_state::CensusState;
use crate::types::AgeRange;

/// Errors surfaced by the registration core.
///
/// Everything except [`CensusError::TransientStorage`] and
/// [`CensusError::VerifierTimeout`] is permanent for the given input and
/// current census state.
#[derive(Debug, thiserror::Error)]
pub enum CensusError {
    #[error("invalid proof: {0}")]
    InvalidProof(String),

    #[error("proof verification failed: {0}")]
    ProofVerification(String),

    #[error("duplicate nullifier {nullifier} in census {census_id}: identity already registered")]
    DuplicateNullifier {
        census_id: String,
        nullifier: String,
    },

    #[error("census not found: {0}")]
    CensusNotFound(String),

    #[error("census is closed: {0}")]
    CensusClosed(String),

    #[error("age requirement not met: census requires {required}, proof attests {actual}")]
    AgeRequirementNotMet { required: AgeRange, actual: AgeRange },

    #[error("submission signature does not match the presented public key")]
    InvalidSignature,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid census state transition from {from} to {to}")]
    InvalidStateTransition { from: CensusState, to: CensusState },

    #[error("storage temporarily unavailable: {0}")]
    TransientStorage(String),

    #[error("proof verifier did not answer within {}ms", .0.as_millis())]
    VerifierTimeout(Duration),

    #[error("merkle accumulator error: {0}")]
    MerkleTree(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CensusError {
    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStorage(_) | Self::VerifierTimeout(_))
    }

    /// Stable machine-readable code, shared with API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidProof(_) => "INVALID_PROOF",
            Self::ProofVerification(_) => "PROOF_VERIFICATION_FAILED",
            Self::DuplicateNullifier { .. } => "DUPLICATE_NULLIFIER",
            Self::CensusNotFound(_) => "CENSUS_NOT_FOUND",
            Self::CensusClosed(_) => "CENSUS_CLOSED",
            Self::AgeRequirementNotMet { .. } => "AGE_REQUIREMENT_NOT_MET",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::TransientStorage(_) => "TRANSIENT_STORAGE",
            Self::VerifierTimeout(_) => "VERIFIER_TIMEOUT",
            Self::MerkleTree(_) => "MERKLE_TREE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code used when the error crosses the API boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidProof(_) | Self::Validation(_) | Self::InvalidSignature => 400,
            Self::Unauthorized(_) => 403,
            Self::CensusNotFound(_) => 404,
            Self::DuplicateNullifier { .. }
            | Self::CensusClosed(_)
            | Self::InvalidStateTransition { .. } => 409,
            Self::ProofVerification(_) | Self::AgeRequirementNotMet { .. } => 422,
            Self::TransientStorage(_) | Self::VerifierTimeout(_) => 503,
            Self::MerkleTree(_) | Self::Internal(_) => 500,
        }
    }
}
