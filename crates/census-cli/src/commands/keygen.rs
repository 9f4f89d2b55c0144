//! `census keygen`: generate an Ed25519 keypair.

use clap::Args;
use census_crypto::KeyPair;

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Derive the keypair from a 32-byte hex seed instead of generating one.
    #[arg(long)]
    pub seed: Option<String>,
}

pub fn run(args: &KeygenArgs) -> anyhow::Result<()> {
    let keypair = match &args.seed {
        Some(seed) => KeyPair::from_secret_hex(seed)?,
        None => KeyPair::generate(),
    };
    println!("Public key (base58): {}", keypair.public_key().to_bs58());
    println!("Secret key (hex):    {}", keypair.to_secret_hex().as_str());
    println!();
    println!("Keep the secret key private. Pass it with --key to sign requests.");
    Ok(())
}
