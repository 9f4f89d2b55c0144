use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use census_core::types::MAX_SNAPSHOT_REF_LEN;
use census_core::{
    AgeRange, Census, CensusConfig, CensusError, CensusId, Continent, GlobalStats,
};
use census_crypto::{PublicKey, Signature};
use census_ledger::CensusStore;

/// Owner of census lifecycle state and per-census counters.
///
/// Every mutation runs under the census's write lock: the updated record is
/// persisted first and only then becomes visible in the cache.
pub struct CensusRegistry {
    censuses: DashMap<CensusId, Census>,
    write_locks: DashMap<CensusId, Arc<Mutex<()>>>,
    store: Arc<dyn CensusStore>,
}

impl CensusRegistry {
    /// Load every persisted census into the cache.
    pub async fn load(store: Arc<dyn CensusStore>) -> Result<Self, CensusError> {
        let censuses = DashMap::new();
        for census in store.list().await? {
            censuses.insert(census.id.clone(), census);
        }
        tracing::info!(censuses = censuses.len(), "census registry loaded");
        Ok(Self {
            censuses,
            write_locks: DashMap::new(),
            store,
        })
    }

    fn write_lock(&self, id: &CensusId) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create a new, active census. A fresh id is generated unless one is given.
    pub async fn create(
        &self,
        id: Option<CensusId>,
        config: CensusConfig,
    ) -> Result<Census, CensusError> {
        if let Some(creator) = &config.creator {
            PublicKey::from_bs58(creator)
                .map_err(|e| CensusError::Validation(format!("creator key: {}", e)))?;
        }
        let id = id.unwrap_or_else(CensusId::generate);

        let lock = self.write_lock(&id);
        let _guard = lock.lock().await;
        if self.censuses.contains_key(&id) || self.store.get(&id).await?.is_some() {
            return Err(CensusError::Validation(format!("census {} already exists", id)));
        }

        let census = Census::new(id, config, Utc::now())?;
        self.store.put(&census).await?;
        self.censuses.insert(census.id.clone(), census.clone());

        tracing::info!(
            census_id = %census.id,
            name = %census.name,
            enable_location = census.enable_location,
            min_age = %census.min_age,
            "census created"
        );
        Ok(census)
    }

    pub fn get(&self, id: &CensusId) -> Result<Census, CensusError> {
        self.censuses
            .get(id)
            .map(|c| c.value().clone())
            .ok_or_else(|| CensusError::CensusNotFound(id.to_string()))
    }

    /// All censuses, oldest first.
    pub fn list(&self) -> Vec<Census> {
        let mut all: Vec<Census> = self.censuses.iter().map(|c| c.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn ids(&self) -> Vec<CensusId> {
        self.censuses.iter().map(|c| c.key().clone()).collect()
    }

    /// Apply `f` to a copy of the census, persist it, then publish it to the cache.
    async fn mutate<F>(&self, id: &CensusId, f: F) -> Result<Census, CensusError>
    where
        F: FnOnce(&mut Census) -> Result<(), CensusError>,
    {
        let lock = self.write_lock(id);
        let _guard = lock.lock().await;
        let mut census = self.get(id)?;
        f(&mut census)?;
        self.store.put(&census).await?;
        self.censuses.insert(id.clone(), census.clone());
        Ok(census)
    }

    /// Check a creator signature over `message`. Censuses without a creator
    /// key are administered by the node operator.
    pub fn authorize(
        &self,
        census: &Census,
        message: &[u8],
        signature: Option<&str>,
    ) -> Result<(), CensusError> {
        let Some(creator) = &census.creator else {
            return Ok(());
        };
        let signature = signature.ok_or_else(|| {
            CensusError::Unauthorized(format!("census {} requires a creator signature", census.id))
        })?;
        let key = PublicKey::from_bs58(creator)
            .map_err(|e| CensusError::Internal(format!("stored creator key: {}", e)))?;
        let signature = Signature::decode(signature)
            .map_err(|e| CensusError::Unauthorized(format!("malformed signature: {}", e)))?;
        census_crypto::verify(message, &signature, &key).map_err(|_| {
            tracing::warn!(census_id = %census.id, "creator signature rejected");
            CensusError::Unauthorized(format!("signature is not from the creator of {}", census.id))
        })
    }

    /// Move an active census to `Closed`.
    pub async fn close(&self, id: &CensusId) -> Result<Census, CensusError> {
        let census = self.mutate(id, |c| c.close(Utc::now())).await?;
        tracing::info!(census_id = %id, total_members = census.total_members, "census closed");
        Ok(census)
    }

    /// Count one accepted registration. Callers apply entries in index order.
    pub async fn record_member(
        &self,
        id: &CensusId,
        age: AgeRange,
        continent: Continent,
    ) -> Result<Census, CensusError> {
        self.mutate(id, |c| c.record_member(age, continent, Utc::now()))
            .await
    }

    /// Overwrite the published root fields. Never touches counters.
    ///
    /// `leaf_count` is the number of leaves the root covers, when known.
    pub async fn publish_root(
        &self,
        id: &CensusId,
        root: [u8; 32],
        snapshot_ref: Option<String>,
        leaf_count: Option<u64>,
    ) -> Result<Census, CensusError> {
        if let Some(reference) = &snapshot_ref {
            if reference.is_empty() || reference.len() > MAX_SNAPSHOT_REF_LEN {
                return Err(CensusError::Validation(format!(
                    "snapshot reference must be 1..={} characters",
                    MAX_SNAPSHOT_REF_LEN
                )));
            }
        }
        let census = self
            .mutate(id, |c| {
                c.ensure_active()?;
                c.merkle_root = root;
                c.snapshot_ref = snapshot_ref;
                if let Some(count) = leaf_count {
                    c.published_leaf_count = count;
                }
                c.updated_at = Utc::now();
                Ok(())
            })
            .await?;
        tracing::info!(
            census_id = %id,
            root = %hex::encode(root),
            leaf_count = census.published_leaf_count,
            "merkle root published"
        );
        Ok(census)
    }

    pub fn global_stats(&self) -> GlobalStats {
        self.censuses.iter().fold(GlobalStats::default(), |mut acc, c| {
            acc.total_censuses += 1;
            if c.is_active() {
                acc.active_censuses += 1;
            }
            acc.total_registrations += c.total_members;
            acc
        })
    }
}
