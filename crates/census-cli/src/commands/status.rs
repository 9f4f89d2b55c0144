//! `census status`: query a running node.

use clap::Args;
use serde::Deserialize;

use census_core::GlobalStats;

use super::DEFAULT_ENDPOINT;
use crate::http;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    stats: GlobalStats,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
    halted_censuses: Vec<String>,
}

pub async fn run(args: &StatusArgs) -> anyhow::Result<()> {
    let status: StatusResponse = http::get(&args.endpoint, "/api/v1/status").await?;
    let health: HealthResponse = http::get(&args.endpoint, "/api/v1/health").await?;

    println!("Node Status:");
    println!("  Version:        {}", status.version);
    println!("  Uptime:         {}s", status.uptime_secs);
    println!("  Health:         {}", health.status);
    println!("  Censuses:       {}", status.stats.total_censuses);
    println!("  Active:         {}", status.stats.active_censuses);
    println!("  Registrations:  {}", status.stats.total_registrations);
    for census in &health.halted_censuses {
        println!("  HALTED:         {}", census);
    }
    Ok(())
}
