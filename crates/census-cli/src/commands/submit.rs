//! `census submit`: sign and submit a registration proof.

use clap::Args;
use serde::Deserialize;
use std::path::PathBuf;

use census_core::NullifierHash;
use census_crypto::{submission_message, KeyPair};
use census_proof::{ProofSubmission, RawProof, RawPublicSignals};

use super::DEFAULT_ENDPOINT;
use crate::http;

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Census id.
    #[arg(short, long)]
    pub census_id: String,

    /// Path to the Groth16 proof JSON (`pi_a`, `pi_b`, `pi_c`, `protocol`, `curve`).
    #[arg(short, long)]
    pub proof: PathBuf,

    /// Nullifier hash (32 bytes hex).
    #[arg(short, long)]
    pub nullifier: String,

    /// Age bucket attested by the proof (0..=6).
    #[arg(long)]
    pub age_range: u8,

    /// Continent attested by the proof (0..=6).
    #[arg(long)]
    pub continent: u8,

    /// Device secret key (hex). A fresh key is used when omitted.
    #[arg(long)]
    pub key: Option<String>,

    /// Only validate and verify; register nothing.
    #[arg(long)]
    pub dry_run: bool,

    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Deserialize)]
struct SubmissionReceipt {
    census_id: String,
    nullifier_hash: String,
    index: u64,
    root: Option<String>,
    status: String,
}

#[derive(Deserialize)]
struct VerifyResponse {
    valid: bool,
}

pub fn build_submission(args: &SubmitArgs, keypair: &KeyPair) -> anyhow::Result<ProofSubmission> {
    let proof: RawProof = serde_json::from_str(&std::fs::read_to_string(&args.proof)?)
        .map_err(|e| anyhow::anyhow!("invalid proof file {}: {}", args.proof.display(), e))?;
    let nullifier = NullifierHash::from_hex(&args.nullifier)?.to_hex();
    let timestamp = chrono::Utc::now().timestamp();

    let message = submission_message(
        &args.census_id,
        &nullifier,
        args.age_range,
        args.continent,
        timestamp,
    );
    Ok(ProofSubmission {
        census_id: args.census_id.clone(),
        proof,
        public_signals: RawPublicSignals {
            nullifier_hash: nullifier,
            age_range: args.age_range.into(),
            continent: args.continent.into(),
            census_id: args.census_id.clone(),
            timestamp,
        },
        signature: census_crypto::sign(&message, keypair).to_bs58(),
        public_key: keypair.public_key().to_bs58(),
    })
}

pub async fn run(args: &SubmitArgs) -> anyhow::Result<()> {
    let keypair = match &args.key {
        Some(secret) => KeyPair::from_secret_hex(secret)?,
        None => KeyPair::generate(),
    };
    let submission = build_submission(args, &keypair)?;

    if args.dry_run {
        let resp: VerifyResponse =
            http::post(&args.endpoint, "/api/v1/proofs/verify", &submission).await?;
        println!("Proof {}", if resp.valid { "verifies" } else { "does NOT verify" });
        return Ok(());
    }

    let receipt: SubmissionReceipt =
        http::post(&args.endpoint, "/api/v1/proofs/submit", &submission).await?;
    println!("Registration accepted!");
    println!("  Census:     {}", receipt.census_id);
    println!("  Nullifier:  {}", receipt.nullifier_hash);
    println!("  Leaf index: {}", receipt.index);
    println!("  Status:     {}", receipt.status);
    match receipt.root {
        Some(root) => println!("  Root:       {}", root),
        None => println!("  Root:       (pending reconciliation)"),
    }
    Ok(())
}
