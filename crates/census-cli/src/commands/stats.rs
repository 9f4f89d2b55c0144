//! `census stats | audit`: statistics and consistency checks.

use clap::Args;
use serde::Deserialize;

use census_core::{AgeRange, CensusStatistics, Continent, GlobalStats, BUCKET_COUNT};

use super::DEFAULT_ENDPOINT;
use crate::http;

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Census id; global statistics when omitted.
    pub census_id: Option<String>,

    /// Print raw JSON.
    #[arg(long)]
    pub json: bool,

    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Census id.
    pub census_id: String,

    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Deserialize)]
struct AuditReport {
    consistent: bool,
}

fn print_buckets<L: std::fmt::Display>(title: &str, labels: [L; BUCKET_COUNT], counts: &[u64; BUCKET_COUNT]) {
    println!("  {}:", title);
    for (label, count) in labels.iter().zip(counts) {
        println!("    {:<16} {}", label.to_string(), count);
    }
}

pub async fn run(args: &StatsArgs) -> anyhow::Result<()> {
    let Some(census_id) = &args.census_id else {
        let stats: GlobalStats = http::get(&args.endpoint, "/api/v1/stats").await?;
        println!("Censuses:      {}", stats.total_censuses);
        println!("Active:        {}", stats.active_censuses);
        println!("Registrations: {}", stats.total_registrations);
        return Ok(());
    };

    let path = format!("/api/v1/censuses/{}/stats", census_id);
    if args.json {
        let value: serde_json::Value = http::get(&args.endpoint, &path).await?;
        return http::print_json(&value);
    }

    let stats: CensusStatistics = http::get(&args.endpoint, &path).await?;
    println!("Census {}", census_id);
    println!("  Members:      {}", stats.total_members);
    println!("  Last update:  {}", stats.last_updated);
    print_buckets("Age", AgeRange::ALL, &stats.age_distribution);
    print_buckets("Continent", Continent::ALL, &stats.continent_distribution);
    Ok(())
}

pub async fn audit(args: &AuditArgs) -> anyhow::Result<()> {
    let path = format!("/api/v1/censuses/{}/audit", args.census_id);
    let value: serde_json::Value = http::get(&args.endpoint, &path).await?;
    http::print_json(&value)?;
    let report: AuditReport = serde_json::from_value(value)?;
    if !report.consistent {
        anyhow::bail!("census {} is not consistent", args.census_id);
    }
    Ok(())
}
