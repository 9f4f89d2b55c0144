//! `census create | list | show | close`: census administration.

use clap::Args;
use serde::Serialize;

use census_core::{Census, CensusConfig};
use census_crypto::{close_message, KeyPair};

use super::DEFAULT_ENDPOINT;
use crate::http;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Census name.
    #[arg(short, long)]
    pub name: String,

    #[arg(short, long, default_value = "")]
    pub description: String,

    /// Do not collect continent statistics.
    #[arg(long)]
    pub no_location: bool,

    /// Minimum age bucket (0 = under 18 ... 6 = 65 and over).
    #[arg(long, default_value_t = 0)]
    pub min_age: u8,

    /// Secret key (hex) of the census creator; its public key is recorded
    /// and later required to close the census or publish roots.
    #[arg(long)]
    pub creator_key: Option<String>,

    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Census id.
    pub census_id: String,

    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Args, Debug)]
pub struct CloseArgs {
    /// Census id.
    pub census_id: String,

    /// Creator secret key (hex), required when the census has a creator.
    #[arg(long)]
    pub key: Option<String>,

    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Serialize)]
struct CloseRequest {
    signature: Option<String>,
}

fn print_census(census: &Census) {
    println!("Census {}", census.id);
    println!("  Name:         {}", census.name);
    if !census.description.is_empty() {
        println!("  Description:  {}", census.description);
    }
    println!("  State:        {}", census.state);
    println!("  Members:      {}", census.total_members);
    println!("  Min age:      {}", census.min_age);
    println!("  Location:     {}", if census.enable_location { "enabled" } else { "disabled" });
    println!("  Merkle root:  {}", hex::encode(census.merkle_root));
    println!("  Root covers:  {} leaves", census.published_leaf_count);
    if let Some(reference) = &census.snapshot_ref {
        println!("  Snapshot:     {}", reference);
    }
    if let Some(creator) = &census.creator {
        println!("  Creator:      {}", creator);
    }
}

pub async fn create(args: &CreateArgs) -> anyhow::Result<()> {
    let creator = match &args.creator_key {
        Some(secret) => Some(KeyPair::from_secret_hex(secret)?.public_key().to_bs58()),
        None => None,
    };
    let config = CensusConfig {
        name: args.name.clone(),
        description: args.description.clone(),
        enable_location: !args.no_location,
        min_age: args.min_age,
        creator,
    };
    let census: Census = http::post(&args.endpoint, "/api/v1/censuses", &config).await?;
    println!("Census created!");
    print_census(&census);
    Ok(())
}

pub async fn list(args: &ListArgs) -> anyhow::Result<()> {
    let censuses: Vec<Census> = http::get(&args.endpoint, "/api/v1/censuses").await?;
    if censuses.is_empty() {
        println!("No censuses.");
    }
    for census in &censuses {
        println!(
            "{}  {:<8} {:>8} members  {}",
            census.id, census.state, census.total_members, census.name
        );
    }
    Ok(())
}

pub async fn show(args: &ShowArgs) -> anyhow::Result<()> {
    let census: Census =
        http::get(&args.endpoint, &format!("/api/v1/censuses/{}", args.census_id)).await?;
    print_census(&census);
    Ok(())
}

pub async fn close(args: &CloseArgs) -> anyhow::Result<()> {
    let signature = match &args.key {
        Some(secret) => {
            let keypair = KeyPair::from_secret_hex(secret)?;
            Some(census_crypto::sign(&close_message(&args.census_id), &keypair).to_bs58())
        }
        None => None,
    };
    let census: Census = http::post(
        &args.endpoint,
        &format!("/api/v1/censuses/{}/close", args.census_id),
        &CloseRequest { signature },
    )
    .await?;
    println!("Census closed.");
    print_census(&census);
    Ok(())
}
