//! The census node orchestrator.
//!
//! Opens storage, builds the registration service, runs the HTTP API, and
//! drives the background reconciler and root publisher.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

use census_ledger::FsSnapshotStore;
use census_proof::{StructuralVerifier, TimedVerifier};
use census_registry::{CensusService, ServiceConfig, Stores, WorkerHandle};

use crate::commands::{NodeCommand, NullifierResponse, VerifyResponse};
use crate::config::NodeConfig;
use crate::state::NodeState;
use crate::storage::Storage;

/// A census registration node.
pub struct CensusNode {
    config: NodeConfig,
    service: Option<Arc<CensusService>>,
    /// Shared state accessible from HTTP handlers.
    node_state: Option<Arc<NodeState>>,
    /// Receives commands from the HTTP API.
    command_rx: Option<mpsc::Receiver<NodeCommand>>,
    workers: Vec<WorkerHandle>,
}

impl CensusNode {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            service: None,
            node_state: None,
            command_rx: None,
            workers: Vec::new(),
        }
    }

    /// Build the service over persistent stores without starting anything.
    pub async fn open_service(config: &NodeConfig) -> Result<CensusService> {
        let storage = Arc::new(Storage::open(&config.db_path())?);
        tracing::info!(path = %config.db_path().display(), "storage initialized");
        let snapshots = Arc::new(FsSnapshotStore::open(&config.snapshot_dir())?);

        let stores = Stores {
            ledger: storage.clone(),
            records: storage.clone(),
            censuses: storage,
            snapshots,
        };
        let verifier = Arc::new(TimedVerifier::new(
            StructuralVerifier::new(),
            config.pipeline.verify_timeout(),
        ));
        let service_config = ServiceConfig {
            pipeline: config.pipeline.clone(),
            publication: config.publication.policy.clone(),
        };
        Ok(CensusService::new(stores, verifier, service_config).await?)
    }

    /// Initialize and start the node: storage, recovery, background loops, HTTP API.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!("starting census node");

        let service = Arc::new(Self::open_service(&self.config).await?);

        // Replay registrations a previous process accepted but did not finish.
        let report = service.reconcile().await;
        tracing::info!(
            censuses = report.censuses_checked,
            leaves_appended = report.leaves_appended,
            members_counted = report.members_counted,
            failures = report.failures.len(),
            "startup reconciliation finished"
        );

        self.workers.push(
            service
                .reconciler()
                .start(self.config.reconciliation.interval()),
        );
        self.workers
            .push(service.publisher().start(self.config.publication.interval()));

        let (command_tx, command_rx) = mpsc::channel::<NodeCommand>(256);
        let node_state = Arc::new(NodeState::new(command_tx));

        let api_addr: SocketAddr = self.config.api_addr().parse()?;
        let api_state = node_state.clone();
        tokio::spawn(async move {
            if let Err(e) = crate::api::start_api_server(api_addr, api_state).await {
                tracing::error!(error = %e, "HTTP API server error");
            }
        });

        self.service = Some(service);
        self.node_state = Some(node_state);
        self.command_rx = Some(command_rx);
        Ok(())
    }

    /// Run the node's main event loop. Each API command runs in its own task
    /// so slow verifications never block other censuses.
    pub async fn run(&mut self) -> Result<()> {
        let mut command_rx = self
            .command_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;
        let service = self
            .service
            .clone()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;

        tracing::info!("entering main event loop");

        while let Some(cmd) = command_rx.recv().await {
            tracing::debug!(command = cmd.name(), "api command received");
            let service = service.clone();
            tokio::spawn(async move { Self::handle_api_command(cmd, &service).await });
        }
        tracing::info!("API command channel closed");
        Ok(())
    }

    /// Gracefully shut down the node.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("shutting down census node");
        for worker in self.workers.drain(..) {
            worker.shutdown().await;
        }
        self.node_state = None;
        self.service = None;
        tracing::info!("census node shut down");
        Ok(())
    }

    /// Handle a command from the HTTP API.
    async fn handle_api_command(cmd: NodeCommand, service: &CensusService) {
        // A dropped receiver means the HTTP client went away.
        match cmd {
            NodeCommand::CreateCensus { config, reply } => {
                let _ = reply.send(service.create_census(config).await);
            }
            NodeCommand::GetCensus { census_id, reply } => {
                let _ = reply.send(service.get_census(&census_id));
            }
            NodeCommand::ListCensuses { reply } => {
                let _ = reply.send(Ok(service.list_censuses()));
            }
            NodeCommand::SubmitProof { submission, reply } => {
                let _ = reply.send(service.submit_proof(&submission).await);
            }
            NodeCommand::VerifyProof { submission, reply } => {
                let result = service
                    .verify_proof(&submission)
                    .await
                    .map(|valid| VerifyResponse { valid });
                let _ = reply.send(result);
            }
            NodeCommand::CheckNullifier {
                census_id,
                nullifier,
                reply,
            } => {
                let result = service
                    .check_nullifier(&census_id, &nullifier)
                    .await
                    .map(|exists| NullifierResponse {
                        census_id,
                        nullifier_hash: nullifier,
                        exists,
                    });
                let _ = reply.send(result);
            }
            NodeCommand::CensusStats { census_id, reply } => {
                let _ = reply.send(service.get_census_stats(&census_id));
            }
            NodeCommand::GlobalStats { reply } => {
                let _ = reply.send(Ok(service.get_global_stats()));
            }
            NodeCommand::CloseCensus {
                census_id,
                signature,
                reply,
            } => {
                let _ = reply.send(service.close_census(&census_id, signature.as_deref()).await);
            }
            NodeCommand::UpdateMerkleRoot {
                census_id,
                root,
                snapshot_ref,
                signature,
                reply,
            } => {
                let result = service
                    .update_merkle_root(&census_id, root, snapshot_ref, signature.as_deref())
                    .await;
                let _ = reply.send(result);
            }
            NodeCommand::PublishRoot { census_id, reply } => {
                let _ = reply.send(service.publish_root(&census_id).await);
            }
            NodeCommand::MerkleProof {
                census_id,
                nullifier,
                reply,
            } => {
                let _ = reply.send(service.get_merkle_proof(&census_id, &nullifier).await);
            }
            NodeCommand::Audit { census_id, reply } => {
                let _ = reply.send(service.audit(&census_id).await);
            }
            NodeCommand::Health { reply } => {
                let _ = reply.send(Ok(service.health().await));
            }
        }
    }
}
