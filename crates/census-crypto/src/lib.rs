pub mod error;
pub mod hashing;
pub mod keys;
pub mod merkle;
pub mod signing;

pub use error::CryptoError;
pub use hashing::{content_address, hash, leaf_hash, node_hash, Hash};
pub use keys::{KeyPair, PublicKey};
pub use merkle::{compute_root, verify_proof, InclusionProof, MerkleAccumulator, EMPTY_ROOT};
pub use signing::{close_message, root_message, sign, submission_message, verify, Signature};
