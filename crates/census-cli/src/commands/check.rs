//! `census check`: is a nullifier registered?

use clap::Args;
use serde::Deserialize;

use super::DEFAULT_ENDPOINT;
use crate::http;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Census id.
    pub census_id: String,

    /// Nullifier hash (32 bytes hex).
    pub nullifier: String,

    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Deserialize)]
struct NullifierResponse {
    exists: bool,
}

pub async fn run(args: &CheckArgs) -> anyhow::Result<()> {
    let path = format!(
        "/api/v1/censuses/{}/nullifiers/{}",
        args.census_id, args.nullifier
    );
    let resp: NullifierResponse = http::get(&args.endpoint, &path).await?;
    if resp.exists {
        println!("registered");
    } else {
        println!("not registered");
    }
    Ok(())
}
