//! HTTP API server for the census node.
//!
//! Provides REST endpoints for census management, proof submission,
//! nullifier lookups, statistics, Merkle roots and inclusion proofs.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use census_core::{
    types::parse_hex32, Census, CensusConfig, CensusError, CensusId, CensusStatistics, GlobalStats,
    NullifierHash, BUCKET_COUNT,
};
use census_crypto::InclusionProof;
use census_proof::ProofSubmission;
use census_registry::{AuditReport, HealthReport, SubmissionReceipt};

use crate::commands::{NodeCommand, NullifierResponse, VerifyResponse};
use crate::state::NodeState;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

// --- Request / response types ---

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub retryable: bool,
}

impl From<CensusError> for ErrorResponse {
    fn from(err: CensusError) -> Self {
        Self {
            code: err.code().to_string(),
            retryable: err.is_retryable(),
            error: err.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_secs: u64,
    pub stats: GlobalStats,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(flatten)]
    pub report: HealthReport,
}

#[derive(Serialize)]
pub struct DistributionResponse {
    pub census_id: CensusId,
    pub total_members: u64,
    pub buckets: [u64; BUCKET_COUNT],
}

#[derive(Deserialize, Default)]
pub struct CloseCensusRequest {
    /// Creator signature over the close message, when the census has a creator.
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateRootRequest {
    /// 32-byte root, hex.
    pub root: String,
    #[serde(default)]
    pub snapshot_ref: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

fn error_response(err: CensusError) -> ApiError {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.into()))
}

fn parse_census_id(raw: String) -> Result<CensusId, ApiError> {
    CensusId::new(raw).map_err(error_response)
}

fn parse_nullifier(raw: &str) -> Result<NullifierHash, ApiError> {
    NullifierHash::from_hex(raw).map_err(error_response)
}

// --- Handlers ---

async fn handle_health(State(state): State<Arc<NodeState>>) -> ApiResult<HealthResponse> {
    let (reply, rx) = tokio::sync::oneshot::channel();
    let Json(report) = send_command_and_await(&state, NodeCommand::Health { reply }, rx).await?;
    let status = if report.is_healthy() { "ok" } else { "degraded" };
    Ok(Json(HealthResponse {
        status: status.into(),
        report,
    }))
}

async fn handle_status(State(state): State<Arc<NodeState>>) -> ApiResult<StatusResponse> {
    let (reply, rx) = tokio::sync::oneshot::channel();
    let Json(stats) = send_command_and_await(&state, NodeCommand::GlobalStats { reply }, rx).await?;
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        stats,
    }))
}

async fn handle_global_stats(State(state): State<Arc<NodeState>>) -> ApiResult<GlobalStats> {
    let (reply, rx) = tokio::sync::oneshot::channel();
    send_command_and_await(&state, NodeCommand::GlobalStats { reply }, rx).await
}

async fn handle_create_census(
    State(state): State<Arc<NodeState>>,
    Json(config): Json<CensusConfig>,
) -> ApiResult<Census> {
    let (reply, rx) = tokio::sync::oneshot::channel();
    send_command_and_await(&state, NodeCommand::CreateCensus { config, reply }, rx).await
}

async fn handle_list_censuses(State(state): State<Arc<NodeState>>) -> ApiResult<Vec<Census>> {
    let (reply, rx) = tokio::sync::oneshot::channel();
    send_command_and_await(&state, NodeCommand::ListCensuses { reply }, rx).await
}

async fn handle_get_census(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<String>,
) -> ApiResult<Census> {
    let census_id = parse_census_id(id)?;
    let (reply, rx) = tokio::sync::oneshot::channel();
    send_command_and_await(&state, NodeCommand::GetCensus { census_id, reply }, rx).await
}

async fn handle_close_census(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<String>,
    body: Option<Json<CloseCensusRequest>>,
) -> ApiResult<Census> {
    let census_id = parse_census_id(id)?;
    let Json(req) = body.unwrap_or_default();
    let (reply, rx) = tokio::sync::oneshot::channel();
    let cmd = NodeCommand::CloseCensus {
        census_id,
        signature: req.signature,
        reply,
    };
    send_command_and_await(&state, cmd, rx).await
}

async fn handle_update_root(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRootRequest>,
) -> ApiResult<Census> {
    let census_id = parse_census_id(id)?;
    let root = parse_hex32(&req.root).map_err(error_response)?;
    let (reply, rx) = tokio::sync::oneshot::channel();
    let cmd = NodeCommand::UpdateMerkleRoot {
        census_id,
        root,
        snapshot_ref: req.snapshot_ref,
        signature: req.signature,
        reply,
    };
    send_command_and_await(&state, cmd, rx).await
}

async fn handle_publish_root(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<String>,
) -> ApiResult<Census> {
    let census_id = parse_census_id(id)?;
    let (reply, rx) = tokio::sync::oneshot::channel();
    send_command_and_await(&state, NodeCommand::PublishRoot { census_id, reply }, rx).await
}

async fn census_stats(state: &Arc<NodeState>, id: String) -> ApiResult<CensusStatistics> {
    let census_id = parse_census_id(id)?;
    let (reply, rx) = tokio::sync::oneshot::channel();
    send_command_and_await(state, NodeCommand::CensusStats { census_id, reply }, rx).await
}

async fn handle_census_stats(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<String>,
) -> ApiResult<CensusStatistics> {
    census_stats(&state, id).await
}

async fn handle_age_distribution(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<String>,
) -> ApiResult<DistributionResponse> {
    let census_id = parse_census_id(id.clone())?;
    let Json(stats) = census_stats(&state, id).await?;
    Ok(Json(DistributionResponse {
        census_id,
        total_members: stats.total_members,
        buckets: stats.age_distribution,
    }))
}

async fn handle_continent_distribution(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<String>,
) -> ApiResult<DistributionResponse> {
    let census_id = parse_census_id(id.clone())?;
    let Json(stats) = census_stats(&state, id).await?;
    Ok(Json(DistributionResponse {
        census_id,
        total_members: stats.total_members,
        buckets: stats.continent_distribution,
    }))
}

async fn handle_check_nullifier(
    State(state): State<Arc<NodeState>>,
    Path((id, nullifier)): Path<(String, String)>,
) -> ApiResult<NullifierResponse> {
    let census_id = parse_census_id(id)?;
    let nullifier = parse_nullifier(&nullifier)?;
    let (reply, rx) = tokio::sync::oneshot::channel();
    let cmd = NodeCommand::CheckNullifier {
        census_id,
        nullifier,
        reply,
    };
    send_command_and_await(&state, cmd, rx).await
}

async fn handle_merkle_proof(
    State(state): State<Arc<NodeState>>,
    Path((id, nullifier)): Path<(String, String)>,
) -> ApiResult<InclusionProof> {
    let census_id = parse_census_id(id)?;
    let nullifier = parse_nullifier(&nullifier)?;
    let (reply, rx) = tokio::sync::oneshot::channel();
    let cmd = NodeCommand::MerkleProof {
        census_id,
        nullifier,
        reply,
    };
    send_command_and_await(&state, cmd, rx).await
}

async fn handle_audit(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<String>,
) -> ApiResult<AuditReport> {
    let census_id = parse_census_id(id)?;
    let (reply, rx) = tokio::sync::oneshot::channel();
    send_command_and_await(&state, NodeCommand::Audit { census_id, reply }, rx).await
}

async fn handle_submit_proof(
    State(state): State<Arc<NodeState>>,
    Json(submission): Json<ProofSubmission>,
) -> ApiResult<SubmissionReceipt> {
    let (reply, rx) = tokio::sync::oneshot::channel();
    let cmd = NodeCommand::SubmitProof {
        submission: Box::new(submission),
        reply,
    };
    send_command_and_await(&state, cmd, rx).await
}

async fn handle_verify_proof(
    State(state): State<Arc<NodeState>>,
    Json(submission): Json<ProofSubmission>,
) -> ApiResult<VerifyResponse> {
    let (reply, rx) = tokio::sync::oneshot::channel();
    let cmd = NodeCommand::VerifyProof {
        submission: Box::new(submission),
        reply,
    };
    send_command_and_await(&state, cmd, rx).await
}

/// Helper to send a command and await the reply.
async fn send_command_and_await<T: Serialize>(
    state: &Arc<NodeState>,
    cmd: NodeCommand,
    reply_rx: tokio::sync::oneshot::Receiver<Result<T, CensusError>>,
) -> ApiResult<T> {
    state.command_tx.send(cmd).await.map_err(|_| {
        error_response(CensusError::Internal("node event loop not running".into()))
    })?;

    match reply_rx.await {
        Ok(Ok(resp)) => Ok(Json(resp)),
        Ok(Err(e)) => Err(error_response(e)),
        Err(_) => Err(error_response(CensusError::Internal(
            "event loop dropped the reply channel".into(),
        ))),
    }
}

// --- Server ---

pub fn build_router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(handle_health))
        .route("/api/v1/status", get(handle_status))
        .route("/api/v1/stats", get(handle_global_stats))
        .route("/api/v1/censuses", post(handle_create_census).get(handle_list_censuses))
        .route("/api/v1/censuses/{id}", get(handle_get_census))
        .route("/api/v1/censuses/{id}/close", post(handle_close_census))
        .route("/api/v1/censuses/{id}/root", post(handle_update_root))
        .route("/api/v1/censuses/{id}/publish", post(handle_publish_root))
        .route("/api/v1/censuses/{id}/stats", get(handle_census_stats))
        .route("/api/v1/censuses/{id}/stats/age", get(handle_age_distribution))
        .route(
            "/api/v1/censuses/{id}/stats/continent",
            get(handle_continent_distribution),
        )
        .route(
            "/api/v1/censuses/{id}/nullifiers/{nullifier}",
            get(handle_check_nullifier),
        )
        .route(
            "/api/v1/censuses/{id}/proofs/{nullifier}",
            get(handle_merkle_proof),
        )
        .route("/api/v1/censuses/{id}/audit", get(handle_audit))
        .route("/api/v1/proofs/submit", post(handle_submit_proof))
        .route("/api/v1/proofs/verify", post(handle_verify_proof))
        .with_state(state)
}

pub async fn start_api_server(
    listen_addr: SocketAddr,
    state: Arc<NodeState>,
) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(%listen_addr, "HTTP API server started");
    axum::serve(listener, app).await?;
    Ok(())
}
