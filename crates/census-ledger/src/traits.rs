use async_trait::async_trait;

use census_core::{
    AgeRange, Census, CensusId, Continent, NullifierEntry, NullifierHash, RegistrationRecord,
};

use crate::error::StoreError;

/// Result of an atomic ledger insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// First writer for the key; the entry carries its fresh index.
    Accepted(NullifierEntry),
    /// The key already exists. Final: never retried.
    Duplicate { existing_index: u64 },
}

impl InsertOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Authoritative nullifier ledger.
///
/// `try_register` is the only operation that decides whether an identity has
/// registered. It must be linearizable per `(census_id, nullifier)`: of any
/// number of concurrent calls with the same key exactly one is `Accepted`.
/// Indexes are assigned per census, 0-based, without gaps or reuse.
#[async_trait]
pub trait NullifierLedger: Send + Sync {
    /// Insert the nullifier if absent, assigning the next index; fail otherwise.
    async fn try_register(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
        age_range: AgeRange,
        continent: Continent,
    ) -> Result<InsertOutcome, StoreError>;

    /// Whether the nullifier was accepted for the census.
    async fn contains(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<bool, StoreError>;

    /// The accepted entry for a nullifier, if any.
    async fn get(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<Option<NullifierEntry>, StoreError>;

    /// Entries with `index >= from_index`, in index order.
    async fn entries_from(
        &self,
        census_id: &CensusId,
        from_index: u64,
    ) -> Result<Vec<NullifierEntry>, StoreError>;

    /// Number of accepted entries for the census.
    async fn count(&self, census_id: &CensusId) -> Result<u64, StoreError>;
}

/// Off-chain projection of registration attempts.
///
/// Pending and verified records are keyed by `(census_id, nullifier)`;
/// rejected records are kept by id so repeated duplicates do not overwrite
/// the accepted record.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Insert or update a record. A verified record is never downgraded.
    async fn put(&self, record: RegistrationRecord) -> Result<(), StoreError>;

    /// The accepted (pending or verified) record for a nullifier.
    async fn get(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<Option<RegistrationRecord>, StoreError>;

    /// All records of a census, rejected ones included.
    async fn list(&self, census_id: &CensusId) -> Result<Vec<RegistrationRecord>, StoreError>;
}

/// Persistence of census records.
#[async_trait]
pub trait CensusStore: Send + Sync {
    async fn put(&self, census: &Census) -> Result<(), StoreError>;

    async fn get(&self, id: &CensusId) -> Result<Option<Census>, StoreError>;

    async fn list(&self) -> Result<Vec<Census>, StoreError>;
}

/// Content-addressed storage for published leaf snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store a document and return its reference (hex BLAKE3 of the bytes).
    async fn put(&self, document: &[u8]) -> Result<String, StoreError>;

    async fn get(&self, reference: &str) -> Result<Option<Vec<u8>>, StoreError>;
}
