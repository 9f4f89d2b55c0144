use async_trait::async_trait;
use std::time::Duration;

use census_core::CensusId;

use crate::error::ProofError;
use crate::groth16::{Groth16Proof, PublicSignals};

/// Zero-knowledge proof verification capability.
///
/// Implementations are pure from the caller's point of view: no observable
/// side effects, and the same inputs always produce the same answer. An
/// invalid proof is reported as `Ok(false)`; `Err` is reserved for the
/// verifier itself failing.
#[async_trait]
pub trait ProofVerifier: Send + Sync {
    /// Check `proof` against `signals` for the census the request targets.
    ///
    /// Must return `Ok(false)` when `signals.census_id != census_id`.
    async fn verify(
        &self,
        proof: &Groth16Proof,
        signals: &PublicSignals,
        census_id: &CensusId,
    ) -> Result<bool, ProofError>;

    /// Short name used in logs (e.g. "structural").
    fn verifier_id(&self) -> &str;
}

/// Verifier that accepts every well-formed proof bound to the requested census.
///
/// Stands in for the circuit verifier until a verification key is deployed;
/// shapes and ranges are already enforced by boundary validation.
#[derive(Debug, Default, Clone)]
pub struct StructuralVerifier;

impl StructuralVerifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProofVerifier for StructuralVerifier {
    async fn verify(
        &self,
        _proof: &Groth16Proof,
        signals: &PublicSignals,
        census_id: &CensusId,
    ) -> Result<bool, ProofError> {
        Ok(&signals.census_id == census_id)
    }

    fn verifier_id(&self) -> &str {
        "structural"
    }
}

/// Bounds every call of the wrapped verifier by a timeout.
pub struct TimedVerifier<V> {
    inner: V,
    timeout: Duration,
}

impl<V: ProofVerifier> TimedVerifier<V> {
    pub fn new(inner: V, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<V: ProofVerifier> ProofVerifier for TimedVerifier<V> {
    async fn verify(
        &self,
        proof: &Groth16Proof,
        signals: &PublicSignals,
        census_id: &CensusId,
    ) -> Result<bool, ProofError> {
        match tokio::time::timeout(self.timeout, self.inner.verify(proof, signals, census_id)).await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    verifier = self.inner.verifier_id(),
                    census_id = %census_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "proof verification timed out"
                );
                Err(ProofError::Timeout(self.timeout))
            }
        }
    }

    fn verifier_id(&self) -> &str {
        self.inner.verifier_id()
    }
}
