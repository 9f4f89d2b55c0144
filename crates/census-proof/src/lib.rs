//! zk-Census Proof: the boundary where loosely typed proof submissions become
//! closed, validated structures.
//!
//! - [`groth16`]: proof and public-signal shapes, structural validation
//! - [`submission`]: the signed submission envelope and its signature check
//! - [`verifier`]: the `ProofVerifier` capability and a time-bounded wrapper

pub mod error;
pub mod groth16;
pub mod submission;
pub mod verifier;

pub use error::ProofError;
pub use groth16::{FieldElement, Groth16Proof, PublicSignals, RawProof, RawPublicSignals};
pub use submission::{ProofSubmission, ValidatedSubmission};
pub use verifier::{ProofVerifier, StructuralVerifier, TimedVerifier};
