//! zk-Census CLI: census administration and proof submission.
//!
//! Subcommands: keygen, create, list, show, submit, check, stats, close,
//! root, publish, proof, audit, status.

mod commands;
mod http;

use clap::{Parser, Subcommand};

/// zk-Census: anonymous census registration.
#[derive(Parser, Debug)]
#[command(name = "census", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an Ed25519 keypair for signing submissions or administering a census.
    Keygen(commands::keygen::KeygenArgs),
    /// Create a census.
    Create(commands::census::CreateArgs),
    /// List censuses.
    List(commands::census::ListArgs),
    /// Show one census.
    Show(commands::census::ShowArgs),
    /// Close a census.
    Close(commands::census::CloseArgs),
    /// Submit a registration proof.
    Submit(commands::submit::SubmitArgs),
    /// Check whether a nullifier is registered.
    Check(commands::check::CheckArgs),
    /// Show census or global statistics.
    Stats(commands::stats::StatsArgs),
    /// Set the published Merkle root of a census.
    Root(commands::root::RootArgs),
    /// Publish the current accumulator root of a census.
    Publish(commands::root::PublishArgs),
    /// Fetch the inclusion proof of a nullifier.
    Proof(commands::root::ProofArgs),
    /// Run a consistency audit of a census.
    Audit(commands::stats::AuditArgs),
    /// Query the status of a running node.
    Status(commands::status::StatusArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Keygen(args) => commands::keygen::run(args),
        Commands::Create(args) => commands::census::create(args).await,
        Commands::List(args) => commands::census::list(args).await,
        Commands::Show(args) => commands::census::show(args).await,
        Commands::Close(args) => commands::census::close(args).await,
        Commands::Submit(args) => commands::submit::run(args).await,
        Commands::Check(args) => commands::check::run(args).await,
        Commands::Stats(args) => commands::stats::run(args).await,
        Commands::Root(args) => commands::root::update(args).await,
        Commands::Publish(args) => commands::root::publish(args).await,
        Commands::Proof(args) => commands::root::proof(args).await,
        Commands::Audit(args) => commands::stats::audit(args).await,
        Commands::Status(args) => commands::status::run(args).await,
    }
}
