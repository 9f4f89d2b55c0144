//! `census root | publish | proof`: Merkle roots and inclusion proofs.

use clap::Args;
use serde::Serialize;

use census_core::{types::parse_hex32, Census};
use census_crypto::{root_message, verify_proof, InclusionProof, KeyPair};

use super::DEFAULT_ENDPOINT;
use crate::http;

#[derive(Args, Debug)]
pub struct RootArgs {
    /// Census id.
    pub census_id: String,

    /// Root to publish (32 bytes hex).
    #[arg(short, long)]
    pub root: String,

    /// Reference to the leaf snapshot the root was computed from.
    #[arg(long)]
    pub snapshot_ref: Option<String>,

    /// Creator secret key (hex), required when the census has a creator.
    #[arg(long)]
    pub key: Option<String>,

    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Census id.
    pub census_id: String,

    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Args, Debug)]
pub struct ProofArgs {
    /// Census id.
    pub census_id: String,

    /// Nullifier hash (32 bytes hex).
    pub nullifier: String,

    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Serialize)]
struct UpdateRootRequest {
    root: String,
    snapshot_ref: Option<String>,
    signature: Option<String>,
}

pub async fn update(args: &RootArgs) -> anyhow::Result<()> {
    let root = hex::encode(parse_hex32(&args.root)?);
    let signature = match &args.key {
        Some(secret) => {
            let keypair = KeyPair::from_secret_hex(secret)?;
            let message = root_message(
                &args.census_id,
                &root,
                args.snapshot_ref.as_deref().unwrap_or(""),
            );
            Some(census_crypto::sign(&message, &keypair).to_bs58())
        }
        None => None,
    };
    let body = UpdateRootRequest {
        root,
        snapshot_ref: args.snapshot_ref.clone(),
        signature,
    };
    let census: Census = http::post(
        &args.endpoint,
        &format!("/api/v1/censuses/{}/root", args.census_id),
        &body,
    )
    .await?;
    println!("Merkle root updated: {}", hex::encode(census.merkle_root));
    Ok(())
}

pub async fn publish(args: &PublishArgs) -> anyhow::Result<()> {
    let census: Census = http::post(
        &args.endpoint,
        &format!("/api/v1/censuses/{}/publish", args.census_id),
        &serde_json::json!({}),
    )
    .await?;
    println!("Published root {}", hex::encode(census.merkle_root));
    println!("  Leaves:    {}", census.published_leaf_count);
    if let Some(reference) = census.snapshot_ref {
        println!("  Snapshot:  {}", reference);
    }
    Ok(())
}

pub async fn proof(args: &ProofArgs) -> anyhow::Result<()> {
    let path = format!(
        "/api/v1/censuses/{}/proofs/{}",
        args.census_id, args.nullifier
    );
    let proof: InclusionProof = http::get(&args.endpoint, &path).await?;
    http::print_json(&serde_json::to_value(&proof)?)?;
    if verify_proof(&proof) {
        println!("proof verifies against root {}", hex::encode(proof.root));
    } else {
        anyhow::bail!("proof returned by the node does not verify");
    }
    Ok(())
}
