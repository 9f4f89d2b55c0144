//! RocksDB storage backend for the census node.
//!
//! One database serves the nullifier ledger, the registration records and
//! the census records. Keys are `<census_id> 0x00 <suffix>`; census ids
//! never contain a zero byte, so a census is a contiguous key range.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex};

use census_core::{
    AgeRange, Census, CensusId, Continent, NullifierEntry, NullifierHash, RegistrationRecord,
    RegistrationStatus,
};
use census_ledger::{CensusStore, InsertOutcome, NullifierLedger, RegistrationStore, StoreError};

/// Column family names for different data types.
const CF_CENSUSES: &str = "censuses";
/// `(census, nullifier)` to ledger index.
const CF_NULLIFIERS: &str = "nullifiers";
/// `(census, index)` to the ledger entry.
const CF_LEDGER: &str = "ledger";
/// Census id to the number of ledger entries.
const CF_LEDGER_COUNT: &str = "ledger_count";
const CF_REGISTRATIONS: &str = "registrations";
const CF_REJECTED: &str = "rejected";

const ALL_CFS: [&str; 6] = [
    CF_CENSUSES,
    CF_NULLIFIERS,
    CF_LEDGER,
    CF_LEDGER_COUNT,
    CF_REGISTRATIONS,
    CF_REJECTED,
];

/// RocksDB-backed storage for the census node.
///
/// Cloning shares the database. Writes that take a lock run on the blocking
/// pool, so an awaiting caller can time them out.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
}

struct StorageInner {
    db: DB,
    /// Serializes the check-and-insert of each census ledger.
    ledger_locks: DashMap<CensusId, Arc<Mutex<()>>>,
    /// Serializes read-modify-write of registration records.
    records_lock: Mutex<()>,
}

fn unavailable(err: rocksdb::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn census_prefix(census_id: &CensusId) -> Vec<u8> {
    let mut key = census_id.as_str().as_bytes().to_vec();
    key.push(0);
    key
}

fn census_key(census_id: &CensusId, suffix: &[u8]) -> Vec<u8> {
    let mut key = census_prefix(census_id);
    key.extend_from_slice(suffix);
    key
}

fn decode_u64(bytes: &[u8]) -> Result<u64, StoreError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("expected 8-byte counter, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

impl Storage {
    /// Open or create a RocksDB database at the given path with column families.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self {
            inner: Arc::new(StorageInner {
                db,
                ledger_locks: DashMap::new(),
                records_lock: Mutex::new(()),
            }),
        })
    }

    /// Run `op` against the database on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&StorageInner) -> Result<T, StoreError> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| StoreError::Unavailable(format!("storage task failed: {}", e)))?
    }
}

impl StorageInner {
    fn cf(&self, cf_name: &str) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::Unavailable(format!("column family '{}' not found", cf_name)))
    }

    fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(&cf, key, value).map_err(unavailable)
    }

    fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf(cf_name)?;
        self.db.get_cf(&cf, key).map_err(unavailable)
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>, StoreError> {
        match self.get(cf_name, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Values of every key in `cf_name` starting at `start` that share `prefix`.
    fn scan<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        prefix: &[u8],
        start: &[u8],
    ) -> Result<Vec<T>, StoreError> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(start, Direction::Forward))
        {
            let (key, value) = item.map_err(unavailable)?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn ledger_lock(&self, census_id: &CensusId) -> Arc<Mutex<()>> {
        self.ledger_locks
            .entry(census_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn ledger_count(&self, census_id: &CensusId) -> Result<u64, StoreError> {
        match self.get(CF_LEDGER_COUNT, census_id.as_str().as_bytes())? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(0),
        }
    }

    /// Exists-check, index assignment and the three writes of an insert,
    /// applied as one write batch under the census ledger lock.
    fn insert_entry(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
        age_range: AgeRange,
        continent: Continent,
    ) -> Result<InsertOutcome, StoreError> {
        let lock = self.ledger_lock(census_id);
        let _guard = lock
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger lock poisoned".into()))?;

        let nullifier_key = census_key(census_id, nullifier.as_bytes());
        if let Some(bytes) = self.get(CF_NULLIFIERS, &nullifier_key)? {
            return Ok(InsertOutcome::Duplicate {
                existing_index: decode_u64(&bytes)?,
            });
        }

        let index = self.ledger_count(census_id)?;
        let entry = NullifierEntry {
            census_id: census_id.clone(),
            nullifier_hash: *nullifier,
            index,
            age_range,
            continent,
            timestamp: Utc::now(),
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(&self.cf(CF_NULLIFIERS)?, &nullifier_key, index.to_be_bytes());
        batch.put_cf(
            &self.cf(CF_LEDGER)?,
            census_key(census_id, &index.to_be_bytes()),
            serde_json::to_vec(&entry)?,
        );
        batch.put_cf(
            &self.cf(CF_LEDGER_COUNT)?,
            census_id.as_str().as_bytes(),
            (index + 1).to_be_bytes(),
        );
        self.db.write(batch).map_err(unavailable)?;

        tracing::debug!(census_id = %census_id, index, "ledger entry written");
        Ok(InsertOutcome::Accepted(entry))
    }

    fn put_record(&self, record: &RegistrationRecord) -> Result<(), StoreError> {
        let _guard = self
            .records_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("records lock poisoned".into()))?;

        if record.status == RegistrationStatus::Rejected {
            let key = census_key(&record.census_id, record.id.as_bytes());
            return self.put(CF_REJECTED, &key, &serde_json::to_vec(record)?);
        }

        let key = census_key(&record.census_id, record.nullifier_hash.as_bytes());
        if let Some(existing) = self.get_json::<RegistrationRecord>(CF_REGISTRATIONS, &key)? {
            if existing.status == RegistrationStatus::Verified {
                return Ok(());
            }
        }
        self.put(CF_REGISTRATIONS, &key, &serde_json::to_vec(record)?)
    }
}

#[async_trait]
impl NullifierLedger for Storage {
    async fn try_register(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
        age_range: AgeRange,
        continent: Continent,
    ) -> Result<InsertOutcome, StoreError> {
        let census_id = census_id.clone();
        let nullifier = *nullifier;
        self.blocking(move |db| db.insert_entry(&census_id, &nullifier, age_range, continent))
            .await
    }

    async fn contains(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<bool, StoreError> {
        let key = census_key(census_id, nullifier.as_bytes());
        Ok(self.inner.get(CF_NULLIFIERS, &key)?.is_some())
    }

    async fn get(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<Option<NullifierEntry>, StoreError> {
        let key = census_key(census_id, nullifier.as_bytes());
        let Some(bytes) = self.inner.get(CF_NULLIFIERS, &key)? else {
            return Ok(None);
        };
        let index = decode_u64(&bytes)?;
        self.inner.get_json(CF_LEDGER, &census_key(census_id, &index.to_be_bytes()))
    }

    async fn entries_from(
        &self,
        census_id: &CensusId,
        from_index: u64,
    ) -> Result<Vec<NullifierEntry>, StoreError> {
        let prefix = census_prefix(census_id);
        let start = census_key(census_id, &from_index.to_be_bytes());
        self.inner.scan(CF_LEDGER, &prefix, &start)
    }

    async fn count(&self, census_id: &CensusId) -> Result<u64, StoreError> {
        self.inner.ledger_count(census_id)
    }
}

#[async_trait]
impl RegistrationStore for Storage {
    async fn put(&self, record: RegistrationRecord) -> Result<(), StoreError> {
        self.blocking(move |db| db.put_record(&record)).await
    }

    async fn get(
        &self,
        census_id: &CensusId,
        nullifier: &NullifierHash,
    ) -> Result<Option<RegistrationRecord>, StoreError> {
        self.inner.get_json(CF_REGISTRATIONS, &census_key(census_id, nullifier.as_bytes()))
    }

    async fn list(&self, census_id: &CensusId) -> Result<Vec<RegistrationRecord>, StoreError> {
        let prefix = census_prefix(census_id);
        let mut records: Vec<RegistrationRecord> = self.inner.scan(CF_REGISTRATIONS, &prefix, &prefix)?;
        records.extend(self.inner.scan::<RegistrationRecord>(CF_REJECTED, &prefix, &prefix)?);
        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}

#[async_trait]
impl CensusStore for Storage {
    async fn put(&self, census: &Census) -> Result<(), StoreError> {
        self.inner.put(
            CF_CENSUSES,
            census.id.as_str().as_bytes(),
            &serde_json::to_vec(census)?,
        )
    }

    async fn get(&self, id: &CensusId) -> Result<Option<Census>, StoreError> {
        self.inner.get_json(CF_CENSUSES, id.as_str().as_bytes())
    }

    async fn list(&self) -> Result<Vec<Census>, StoreError> {
        let mut all: Vec<Census> = self.inner.scan(CF_CENSUSES, &[], &[])?;
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}
