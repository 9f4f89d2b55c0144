/// Cryptographic operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("leaf index {index} out of range for {len} leaves")]
    IndexOutOfRange { index: u64, len: u64 },

    #[error("recomputed root {recomputed} does not match cached root {cached}")]
    RootMismatch { cached: String, recomputed: String },
}
