use ed25519_dalek::{Signer, Verifier};

use crate::error::CryptoError;
use crate::keys::{KeyPair, PublicKey};

/// Ed25519 signature (64 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    inner: ed25519_dalek::Signature,
}

impl Signature {
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes_arr: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidInput(format!("signature must be 64 bytes, got {}", bytes.len()))
        })?;
        Ok(Self {
            inner: ed25519_dalek::Signature::from_bytes(&bytes_arr),
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn to_bs58(&self) -> String {
        bs58::encode(self.to_bytes()).into_string()
    }

    /// Decode a signature sent by a client: 128 hex digits, otherwise base58.
    pub fn decode(encoded: &str) -> Result<Self, CryptoError> {
        let encoded = encoded.trim();
        if encoded.len() == 128 {
            if let Ok(bytes) = hex::decode(encoded) {
                return Self::from_bytes(&bytes);
            }
        }
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| CryptoError::InvalidInput(format!("invalid signature encoding: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

/// Sign a message using Ed25519.
pub fn sign(message: &[u8], keypair: &KeyPair) -> Signature {
    Signature {
        inner: keypair.signing_key().sign(message),
    }
}

/// Verify an Ed25519 signature.
pub fn verify(message: &[u8], signature: &Signature, pubkey: &PublicKey) -> Result<(), CryptoError> {
    pubkey
        .verifying_key()
        .verify_strict(message, &signature.inner)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}

/// Message a registrant signs to bind a proof submission to its public signals.
pub fn submission_message(
    census_id: &str,
    nullifier_hex: &str,
    age_range: u8,
    continent: u8,
    timestamp: i64,
) -> Vec<u8> {
    format!(
        "zk-census:submit:{}:{}:{}:{}:{}",
        census_id,
        nullifier_hex.to_ascii_lowercase(),
        age_range,
        continent,
        timestamp
    )
    .into_bytes()
}

/// Message a creator signs to close a census.
pub fn close_message(census_id: &str) -> Vec<u8> {
    format!("zk-census:close:{}", census_id).into_bytes()
}

/// Message a creator signs to publish a root and its snapshot reference.
pub fn root_message(census_id: &str, root_hex: &str, snapshot_ref: &str) -> Vec<u8> {
    format!(
        "zk-census:root:{}:{}:{}",
        census_id,
        root_hex.to_ascii_lowercase(),
        snapshot_ref
    )
    .into_bytes()
}
