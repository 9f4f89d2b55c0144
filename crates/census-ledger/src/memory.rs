//! In-memory store implementations backed by `DashMap`.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use uuid::Uuid;

use census_core::{
    AgeRange, Census, CensusId, Continent, NullifierEntry, NullifierHash, RegistrationRecord,
    RegistrationStatus,
};

use crate::error::StoreError;
use crate::traits::{CensusStore, InsertOutcome, NullifierLedger, RegistrationStore, SnapshotStore};

/// Accepted nullifiers of one census.
#[derive(Debug, Default)]
struct CensusLog {
    by_nullifier: HashMap<NullifierHash, u64>,
    entries: Vec<NullifierEntry>,
}

/// In-memory nullifier ledger.
///
/// The census log is reached through the map's entry guard, so the
/// exists-check, index assignment and insert happen under one shard lock.
#[derive(Debug, Default)]
pub struct MemoryNullifierLedger {
    logs: DashMap<CensusId, CensusLog>,
}

impl MemoryNullifierLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NullifierLedger for MemoryNullifierLedger {
    async fn try_register(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
        age_range: AgeRange,
        continent: Continent,
    ) -> Result<InsertOutcome, StoreError> {
        let mut log = self.logs.entry(census_id.clone()).or_default();
        if let Some(existing_index) = log.by_nullifier.get(nullifier) {
            return Ok(InsertOutcome::Duplicate {
                existing_index: *existing_index,
            });
        }

        let index = log.entries.len() as u64;
        let entry = NullifierEntry {
            census_id: census_id.clone(),
            nullifier_hash: *nullifier,
            index,
            age_range,
            continent,
            timestamp: Utc::now(),
        };
        log.by_nullifier.insert(*nullifier, index);
        log.entries.push(entry.clone());
        Ok(InsertOutcome::Accepted(entry))
    }

    async fn contains(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<bool, StoreError> {
        Ok(self
            .logs
            .get(census_id)
            .map(|log| log.by_nullifier.contains_key(nullifier))
            .unwrap_or(false))
    }

    async fn get(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<Option<NullifierEntry>, StoreError> {
        Ok(self.logs.get(census_id).and_then(|log| {
            log.by_nullifier
                .get(nullifier)
                .and_then(|i| log.entries.get(*i as usize).cloned())
        }))
    }

    async fn entries_from(
        &self,
        census_id: &CensusId,
        from_index: u64,
    ) -> Result<Vec<NullifierEntry>, StoreError> {
        Ok(self
            .logs
            .get(census_id)
            .map(|log| {
                log.entries
                    .iter()
                    .skip(from_index as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self, census_id: &CensusId) -> Result<u64, StoreError> {
        Ok(self
            .logs
            .get(census_id)
            .map(|log| log.entries.len() as u64)
            .unwrap_or(0))
    }
}

/// In-memory registration projection.
#[derive(Debug, Default)]
pub struct MemoryRegistrationStore {
    accepted: DashMap<(CensusId, NullifierHash), RegistrationRecord>,
    rejected: DashMap<Uuid, RegistrationRecord>,
}

impl MemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistrationStore for MemoryRegistrationStore {
    async fn put(&self, record: RegistrationRecord) -> Result<(), StoreError> {
        if record.status == RegistrationStatus::Rejected {
            self.rejected.insert(record.id, record);
            return Ok(());
        }
        let key = (record.census_id.clone(), record.nullifier_hash);
        self.accepted
            .entry(key)
            .and_modify(|existing| {
                if existing.status != RegistrationStatus::Verified {
                    *existing = record.clone();
                }
            })
            .or_insert(record);
        Ok(())
    }

    async fn get(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<Option<RegistrationRecord>, StoreError> {
        Ok(self
            .accepted
            .get(&(census_id.clone(), *nullifier))
            .map(|r| r.value().clone()))
    }

    async fn list(&self, census_id: &CensusId) -> Result<Vec<RegistrationRecord>, StoreError> {
        let accepted = self.accepted.iter().map(|r| r.value().clone());
        let rejected = self.rejected.iter().map(|r| r.value().clone());
        let mut records: Vec<RegistrationRecord> = accepted
            .chain(rejected)
            .filter(|r| &r.census_id == census_id)
            .collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}

/// In-memory census records.
#[derive(Debug, Default)]
pub struct MemoryCensusStore {
    censuses: DashMap<CensusId, Census>,
}

impl MemoryCensusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CensusStore for MemoryCensusStore {
    async fn put(&self, census: &Census) -> Result<(), StoreError> {
        self.censuses.insert(census.id.clone(), census.clone());
        Ok(())
    }

    async fn get(&self, id: &CensusId) -> Result<Option<Census>, StoreError> {
        Ok(self.censuses.get(id).map(|c| c.value().clone()))
    }

    async fn list(&self) -> Result<Vec<Census>, StoreError> {
        let mut all: Vec<Census> = self.censuses.iter().map(|c| c.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}

/// In-memory snapshot documents keyed by content address.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    documents: DashMap<String, Vec<u8>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn put(&self, document: &[u8]) -> Result<String, StoreError> {
        let reference = census_crypto::content_address(document);
        self.documents
            .entry(reference.clone())
            .or_insert_with(|| document.to_vec());
        Ok(reference)
    }

    async fn get(&self, reference: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.documents.get(reference).map(|d| d.value().clone()))
    }
}
