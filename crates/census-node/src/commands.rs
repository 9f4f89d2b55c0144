//! Commands dispatched from the HTTP API to the node event loop.

use serde::Serialize;
use tokio::sync::oneshot;

use census_core::{Census, CensusConfig, CensusError, CensusId, CensusStatistics, GlobalStats, NullifierHash};
use census_crypto::InclusionProof;
use census_proof::ProofSubmission;
use census_registry::{AuditReport, HealthReport, SubmissionReceipt};

pub type Reply<T> = oneshot::Sender<Result<T, CensusError>>;

/// A command sent from the HTTP API to the node's main event loop.
pub enum NodeCommand {
    CreateCensus {
        config: CensusConfig,
        reply: Reply<Census>,
    },
    GetCensus {
        census_id: CensusId,
        reply: Reply<Census>,
    },
    ListCensuses {
        reply: Reply<Vec<Census>>,
    },
    SubmitProof {
        submission: Box<ProofSubmission>,
        reply: Reply<SubmissionReceipt>,
    },
    /// Validate and verify a submission without registering it.
    VerifyProof {
        submission: Box<ProofSubmission>,
        reply: Reply<VerifyResponse>,
    },
    CheckNullifier {
        census_id: CensusId,
        nullifier: NullifierHash,
        reply: Reply<NullifierResponse>,
    },
    CensusStats {
        census_id: CensusId,
        reply: Reply<CensusStatistics>,
    },
    GlobalStats {
        reply: Reply<GlobalStats>,
    },
    CloseCensus {
        census_id: CensusId,
        signature: Option<String>,
        reply: Reply<Census>,
    },
    UpdateMerkleRoot {
        census_id: CensusId,
        root: [u8; 32],
        snapshot_ref: Option<String>,
        signature: Option<String>,
        reply: Reply<Census>,
    },
    /// Publish the current accumulator root now.
    PublishRoot {
        census_id: CensusId,
        reply: Reply<Census>,
    },
    MerkleProof {
        census_id: CensusId,
        nullifier: NullifierHash,
        reply: Reply<InclusionProof>,
    },
    Audit {
        census_id: CensusId,
        reply: Reply<AuditReport>,
    },
    Health {
        reply: Reply<HealthReport>,
    },
}

impl NodeCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateCensus { .. } => "create_census",
            Self::GetCensus { .. } => "get_census",
            Self::ListCensuses { .. } => "list_censuses",
            Self::SubmitProof { .. } => "submit_proof",
            Self::VerifyProof { .. } => "verify_proof",
            Self::CheckNullifier { .. } => "check_nullifier",
            Self::CensusStats { .. } => "census_stats",
            Self::GlobalStats { .. } => "global_stats",
            Self::CloseCensus { .. } => "close_census",
            Self::UpdateMerkleRoot { .. } => "update_merkle_root",
            Self::PublishRoot { .. } => "publish_root",
            Self::MerkleProof { .. } => "merkle_proof",
            Self::Audit { .. } => "audit",
            Self::Health { .. } => "health",
        }
    }
}

/// Response to a verify-only request.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
}

/// Response to a nullifier lookup.
#[derive(Debug, Clone, Serialize)]
pub struct NullifierResponse {
    pub census_id: CensusId,
    pub nullifier_hash: NullifierHash,
    pub exists: bool,
}
