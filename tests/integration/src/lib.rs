//! Shared fixtures for the cross-crate scenario tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use census_core::{
    AgeRange, CensusConfig, CensusId, Continent, NullifierEntry, NullifierHash, RegistrationRecord,
    RegistrationStatus,
};
use census_crypto::{submission_message, KeyPair};
use census_ledger::{
    InsertOutcome, MemoryCensusStore, MemoryNullifierLedger, MemoryRegistrationStore,
    MemorySnapshotStore, NullifierLedger, RegistrationStore, StoreError,
};
use census_proof::{
    Groth16Proof, ProofError, ProofSubmission, ProofVerifier, PublicSignals, RawProof,
    RawPublicSignals, StructuralVerifier,
};
use census_registry::{CensusService, ServiceConfig, Stores};

/// A well-formed Groth16 proof over bn128.
pub fn valid_proof() -> RawProof {
    RawProof {
        pi_a: vec![
            "12345678901234567890".into(),
            "98765432109876543210".into(),
        ],
        pi_b: vec![
            vec!["1".into(), "2".into()],
            vec!["3".into(), "4".into()],
        ],
        pi_c: vec!["5".into(), "6".into()],
        protocol: "groth16".into(),
        curve: "bn128".into(),
    }
}

/// Deterministic nullifier for test identity `n`.
pub fn nullifier(n: u64) -> NullifierHash {
    NullifierHash(census_crypto::hash(&n.to_be_bytes()))
}

/// Builds signed submissions; every field can be overridden.
pub struct SubmissionBuilder {
    census_id: String,
    nullifier: NullifierHash,
    age_range: i64,
    continent: i64,
    timestamp: i64,
    device: KeyPair,
}

impl SubmissionBuilder {
    pub fn new(census_id: &CensusId, nullifier: NullifierHash) -> Self {
        Self {
            census_id: census_id.to_string(),
            nullifier,
            age_range: AgeRange::From25To34 as i64,
            continent: Continent::Asia as i64,
            timestamp: chrono::Utc::now().timestamp(),
            device: KeyPair::generate(),
        }
    }

    pub fn age_range(mut self, age_range: i64) -> Self {
        self.age_range = age_range;
        self
    }

    pub fn continent(mut self, continent: i64) -> Self {
        self.continent = continent;
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn build(self) -> ProofSubmission {
        let message = submission_message(
            &self.census_id,
            &self.nullifier.to_hex(),
            self.age_range.clamp(0, 255) as u8,
            self.continent.clamp(0, 255) as u8,
            self.timestamp,
        );
        ProofSubmission {
            census_id: self.census_id.clone(),
            proof: valid_proof(),
            public_signals: RawPublicSignals {
                nullifier_hash: self.nullifier.to_hex(),
                age_range: self.age_range,
                continent: self.continent,
                census_id: self.census_id,
                timestamp: self.timestamp,
            },
            signature: census_crypto::sign(&message, &self.device).to_bs58(),
            public_key: self.device.public_key().to_bs58(),
        }
    }
}

/// Verifier that records how often it was called.
pub struct CountingVerifier {
    calls: AtomicUsize,
    inner: StructuralVerifier,
    accept: bool,
}

impl CountingVerifier {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            inner: StructuralVerifier::new(),
            accept: true,
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            inner: StructuralVerifier::new(),
            accept: false,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProofVerifier for CountingVerifier {
    async fn verify(
        &self,
        proof: &Groth16Proof,
        signals: &PublicSignals,
        census_id: &CensusId,
    ) -> Result<bool, ProofError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let structural = self.inner.verify(proof, signals, census_id).await?;
        Ok(self.accept && structural)
    }

    fn verifier_id(&self) -> &str {
        "counting"
    }
}

/// Registration store whose `verified` writes can be made to fail.
#[derive(Default)]
pub struct FlakyRecordStore {
    inner: MemoryRegistrationStore,
    fail_verified: AtomicBool,
}

impl FlakyRecordStore {
    pub fn set_failing(&self, failing: bool) {
        self.fail_verified.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RegistrationStore for FlakyRecordStore {
    async fn put(&self, record: RegistrationRecord) -> Result<(), StoreError> {
        if record.status == RegistrationStatus::Verified && self.fail_verified.load(Ordering::SeqCst)
        {
            return Err(StoreError::Unavailable("injected outage".into()));
        }
        self.inner.put(record).await
    }

    async fn get(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<Option<RegistrationRecord>, StoreError> {
        self.inner.get(census_id, nullifier).await
    }

    async fn list(&self, census_id: &CensusId) -> Result<Vec<RegistrationRecord>, StoreError> {
        self.inner.list(census_id).await
    }
}

/// Ledger that can be made to report a different nullifier at index 0,
/// as a corrupted replica would.
#[derive(Default)]
pub struct TamperingLedger {
    inner: MemoryNullifierLedger,
    tamper: AtomicBool,
}

impl TamperingLedger {
    pub fn set_tampering(&self, tamper: bool) {
        self.tamper.store(tamper, Ordering::SeqCst);
    }
}

#[async_trait]
impl NullifierLedger for TamperingLedger {
    async fn try_register(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
        age_range: AgeRange,
        continent: Continent,
    ) -> Result<InsertOutcome, StoreError> {
        self.inner
            .try_register(census_id, nullifier, age_range, continent)
            .await
    }

    async fn contains(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<bool, StoreError> {
        self.inner.contains(census_id, nullifier).await
    }

    async fn get(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<Option<NullifierEntry>, StoreError> {
        self.inner.get(census_id, nullifier).await
    }

    async fn entries_from(
        &self,
        census_id: &CensusId,
        from_index: u64,
    ) -> Result<Vec<NullifierEntry>, StoreError> {
        let mut entries = self.inner.entries_from(census_id, from_index).await?;
        if self.tamper.load(Ordering::SeqCst) {
            if let Some(first) = entries.iter_mut().find(|e| e.index == 0) {
                first.nullifier_hash = NullifierHash([0xee; 32]);
            }
        }
        Ok(entries)
    }

    async fn count(&self, census_id: &CensusId) -> Result<u64, StoreError> {
        self.inner.count(census_id).await
    }
}

/// Ledger whose inserts take `delay` before reaching the store.
pub struct SlowLedger {
    inner: MemoryNullifierLedger,
    delay: Duration,
}

impl SlowLedger {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryNullifierLedger::new(),
            delay,
        }
    }
}

#[async_trait]
impl NullifierLedger for SlowLedger {
    async fn try_register(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
        age_range: AgeRange,
        continent: Continent,
    ) -> Result<InsertOutcome, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner
            .try_register(census_id, nullifier, age_range, continent)
            .await
    }

    async fn contains(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<bool, StoreError> {
        self.inner.contains(census_id, nullifier).await
    }

    async fn get(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<Option<NullifierEntry>, StoreError> {
        self.inner.get(census_id, nullifier).await
    }

    async fn entries_from(
        &self,
        census_id: &CensusId,
        from_index: u64,
    ) -> Result<Vec<NullifierEntry>, StoreError> {
        self.inner.entries_from(census_id, from_index).await
    }

    async fn count(&self, census_id: &CensusId) -> Result<u64, StoreError> {
        self.inner.count(census_id).await
    }
}

/// Fresh in-memory stores.
pub fn memory_stores() -> Stores {
    Stores::in_memory()
}

pub async fn service_over(stores: Stores, verifier: Arc<dyn ProofVerifier>) -> CensusService {
    CensusService::new(stores, verifier, ServiceConfig::default())
        .await
        .expect("service should start")
}

/// Service over fresh in-memory stores with the structural verifier.
pub async fn in_memory_service() -> (CensusService, Stores) {
    let stores = memory_stores();
    let service = service_over(stores.clone(), Arc::new(StructuralVerifier::new())).await;
    (service, stores)
}

/// Stores with a failure-injectable registration store.
pub fn flaky_stores() -> (Stores, Arc<FlakyRecordStore>) {
    let records = Arc::new(FlakyRecordStore::default());
    let stores = Stores {
        ledger: Arc::new(MemoryNullifierLedger::new()),
        records: records.clone(),
        censuses: Arc::new(MemoryCensusStore::new()),
        snapshots: Arc::new(MemorySnapshotStore::new()),
    };
    (stores, records)
}

/// Stores with a tamperable ledger.
pub fn tampering_stores() -> (Stores, Arc<TamperingLedger>) {
    let ledger = Arc::new(TamperingLedger::default());
    let stores = Stores {
        ledger: ledger.clone(),
        records: Arc::new(MemoryRegistrationStore::new()),
        censuses: Arc::new(MemoryCensusStore::new()),
        snapshots: Arc::new(MemorySnapshotStore::new()),
    };
    (stores, ledger)
}

/// Stores whose ledger inserts take `delay`.
pub fn slow_ledger_stores(delay: Duration) -> Stores {
    Stores {
        ledger: Arc::new(SlowLedger::new(delay)),
        records: Arc::new(MemoryRegistrationStore::new()),
        censuses: Arc::new(MemoryCensusStore::new()),
        snapshots: Arc::new(MemorySnapshotStore::new()),
    }
}

pub async fn open_census(service: &CensusService, name: &str) -> CensusId {
    service
        .create_census(CensusConfig::new(name, "integration census"))
        .await
        .expect("census creation should succeed")
        .id
}

/// The ledger accepts a nullifier and the process dies before anything else
/// happens: no tree append, no counters, no records.
pub async fn accept_without_commit(
    stores: &Stores,
    census_id: &CensusId,
    nullifier: NullifierHash,
    age_range: AgeRange,
    continent: Continent,
) -> NullifierEntry {
    match stores
        .ledger
        .try_register(census_id, &nullifier, age_range, continent)
        .await
        .expect("ledger insert should succeed")
    {
        InsertOutcome::Accepted(entry) => entry,
        InsertOutcome::Duplicate { existing_index } => {
            panic!("nullifier already registered at index {}", existing_index)
        }
    }
}
