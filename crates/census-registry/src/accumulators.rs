use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use census_core::{CensusError, CensusId, NullifierEntry, NullifierHash};
use census_crypto::{compute_root, leaf_hash, Hash, InclusionProof, MerkleAccumulator};
use census_ledger::NullifierLedger;

/// Accumulator of one census plus its health flag.
///
/// Holding the guard of a `CensusTree` is the census commit lock: ledger
/// inserts, tree appends and counter updates for a census all happen under it.
#[derive(Debug)]
pub struct CensusTree {
    census_id: CensusId,
    acc: MerkleAccumulator,
    halted: Option<String>,
    hydrated: bool,
    /// Leaves synced from the ledger and not yet reported by a completion pass.
    unreported: u64,
}

impl CensusTree {
    fn new(census_id: CensusId) -> Self {
        Self {
            census_id,
            acc: MerkleAccumulator::new(),
            halted: None,
            hydrated: false,
            unreported: 0,
        }
    }

    pub fn census_id(&self) -> &CensusId {
        &self.census_id
    }

    pub fn len(&self) -> u64 {
        self.acc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acc.is_empty()
    }

    pub fn root(&self) -> Hash {
        self.acc.root()
    }

    pub fn leaves(&self) -> &[Hash] {
        self.acc.leaves()
    }

    pub fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    /// Fail with `MerkleTree` once the accumulator has been halted.
    pub fn ensure_healthy(&self) -> Result<(), CensusError> {
        match &self.halted {
            Some(reason) => Err(CensusError::MerkleTree(format!(
                "census {} halted: {}",
                self.census_id, reason
            ))),
            None => Ok(()),
        }
    }

    /// Stop all further appends and raise an operator alert.
    pub fn halt(&mut self, reason: impl Into<String>) -> CensusError {
        let reason = reason.into();
        tracing::error!(
            alert = true,
            census_id = %self.census_id,
            leaves = self.acc.len(),
            reason = %reason,
            "merkle accumulator halted"
        );
        self.halted = Some(reason.clone());
        CensusError::MerkleTree(format!("census {}: {}", self.census_id, reason))
    }

    /// Append the leaf of `entry` at exactly `entry.index`.
    ///
    /// Re-applying an already present leaf is a no-op. A different leaf at
    /// that position, or a gap, halts the accumulator.
    pub fn append_at(&mut self, entry: &NullifierEntry) -> Result<Hash, CensusError> {
        self.ensure_healthy()?;
        let leaf = leaf_hash(entry.nullifier_hash.as_bytes());
        let len = self.acc.len();

        if entry.index < len {
            return match self.acc.leaf(entry.index) {
                Some(existing) if existing == leaf => Ok(self.acc.root()),
                _ => Err(self.halt(format!(
                    "leaf {} does not match ledger nullifier {}",
                    entry.index, entry.nullifier_hash
                ))),
            };
        }
        if entry.index > len {
            return Err(self.halt(format!(
                "append at index {} would leave a gap after {} leaves",
                entry.index, len
            )));
        }

        let root = self.acc.append(leaf);
        tracing::debug!(
            census_id = %self.census_id,
            index = entry.index,
            root = %hex::encode(root),
            "leaf appended"
        );
        Ok(root)
    }

    /// Append every ledger entry the tree has not seen yet.
    pub async fn sync_from(&mut self, ledger: &dyn NullifierLedger) -> Result<u64, CensusError> {
        self.ensure_healthy()?;
        let missing = ledger.entries_from(&self.census_id, self.acc.len()).await?;
        for entry in &missing {
            self.append_at(entry)?;
        }
        self.hydrated = true;
        let appended = missing.len() as u64;
        self.unreported += appended;
        Ok(appended)
    }

    /// Leaves synced since the last call, including those appended while the
    /// commit lock was being acquired.
    pub fn take_appended(&mut self) -> u64 {
        std::mem::take(&mut self.unreported)
    }

    /// Inclusion proof for a nullifier against the current root.
    pub fn proof_for(&self, entry: &NullifierEntry) -> Result<InclusionProof, CensusError> {
        let proof = self
            .acc
            .proof(entry.index)
            .map_err(|e| CensusError::MerkleTree(e.to_string()))?;
        if proof.leaf != leaf_hash(entry.nullifier_hash.as_bytes()) {
            return Err(CensusError::MerkleTree(format!(
                "leaf {} does not belong to nullifier {}",
                entry.index, entry.nullifier_hash
            )));
        }
        Ok(proof)
    }

    /// Recompute the root from the ledger's ordered nullifiers and compare it
    /// with the accumulator. Halts on mismatch.
    pub fn audit(&mut self, ledger_nullifiers: &[NullifierHash]) -> Result<Hash, CensusError> {
        self.ensure_healthy()?;
        if let Err(e) = self.acc.verify_integrity() {
            return Err(self.halt(e.to_string()));
        }
        let leaves: Vec<Hash> = ledger_nullifiers
            .iter()
            .take(self.acc.len() as usize)
            .map(|n| leaf_hash(n.as_bytes()))
            .collect();
        let recomputed = compute_root(&leaves);
        if recomputed != self.acc.root() {
            return Err(self.halt(format!(
                "root recomputed from ledger {} differs from accumulator root {}",
                hex::encode(recomputed),
                hex::encode(self.acc.root())
            )));
        }
        Ok(recomputed)
    }
}

/// Per-census accumulators, each behind its own commit lock.
#[derive(Debug, Default)]
pub struct AccumulatorSet {
    trees: DashMap<CensusId, Arc<Mutex<CensusTree>>>,
}

impl AccumulatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the commit lock of a census and bring its tree up to the ledger.
    ///
    /// A halted tree is returned as is so callers can report its state.
    pub async fn acquire(
        &self,
        census_id: &CensusId,
        ledger: &dyn NullifierLedger,
    ) -> Result<OwnedMutexGuard<CensusTree>, CensusError> {
        let cell = self
            .trees
            .entry(census_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(CensusTree::new(census_id.clone()))))
            .clone();
        let mut tree = cell.lock_owned().await;
        if tree.halted.is_none() {
            let first = !tree.hydrated;
            let replayed = tree.sync_from(ledger).await?;
            if first && replayed > 0 {
                tracing::info!(census_id = %census_id, leaves = replayed, "accumulator rebuilt from ledger");
            }
        }
        Ok(tree)
    }

    /// Censuses whose accumulator is halted, with the reason.
    pub async fn halted(&self) -> Vec<(CensusId, String)> {
        let cells: Vec<Arc<Mutex<CensusTree>>> =
            self.trees.iter().map(|t| t.value().clone()).collect();
        let mut out = Vec::new();
        for cell in cells {
            let tree = cell.lock().await;
            if let Some(reason) = tree.halted() {
                out.push((tree.census_id.clone(), reason.to_string()));
            }
        }
        out
    }
}
