//! Append-only binary Merkle accumulator.
//!
//! Leaves sit in index order; the tree is padded on the right with zero
//! sentinels up to the next power of two. Only non-padding nodes are stored,
//! so an append touches one node per level.

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::hashing::{node_hash, Hash};

/// Root of a tree with no leaves. Also the padding sentinel at leaf level.
pub const EMPTY_ROOT: Hash = [0u8; 32];

/// Deepest tree supported (2^63 leaves).
const MAX_DEPTH: usize = 63;

/// Authentication path for one leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub leaf_index: u64,
    #[serde(with = "census_core::types::hex32")]
    pub leaf: Hash,
    /// Sibling hashes from the leaf level upward.
    #[serde(with = "hex_seq")]
    pub siblings: Vec<Hash>,
    /// `true` where the running node is the right child at that level.
    pub path_bits: Vec<bool>,
    #[serde(with = "census_core::types::hex32")]
    pub root: Hash,
}

mod hex_seq {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hashes: &[[u8; 32]], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(hashes.iter().map(hex::encode))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<[u8; 32]>, D::Error> {
        let strings = Vec::<String>::deserialize(d)?;
        strings
            .iter()
            .map(|s| census_core::types::parse_hex32(s).map_err(de::Error::custom))
            .collect()
    }
}

/// Hashes of all-padding subtrees: `zeros[k]` covers 2^k sentinel leaves.
fn zero_hashes() -> Vec<Hash> {
    let mut zeros = Vec::with_capacity(MAX_DEPTH + 1);
    zeros.push(EMPTY_ROOT);
    for level in 1..=MAX_DEPTH {
        let below = zeros[level - 1];
        zeros.push(node_hash(&below, &below));
    }
    zeros
}

/// Number of levels above the leaves for `n` leaves: ceil(log2(n)).
fn depth_for(n: usize) -> usize {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

/// Incremental Merkle tree over nullifier leaves.
#[derive(Debug, Clone)]
pub struct MerkleAccumulator {
    /// `layers[0]` are the leaves; `layers[k]` the non-padding nodes at height k.
    layers: Vec<Vec<Hash>>,
    zeros: Vec<Hash>,
}

impl MerkleAccumulator {
    pub fn new() -> Self {
        Self {
            layers: vec![Vec::new()],
            zeros: zero_hashes(),
        }
    }

    /// Rebuild an accumulator by replaying leaves in order.
    pub fn from_leaves<I: IntoIterator<Item = Hash>>(leaves: I) -> Self {
        let mut acc = Self::new();
        for leaf in leaves {
            acc.append(leaf);
        }
        acc
    }

    pub fn len(&self) -> u64 {
        self.layers[0].len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    pub fn depth(&self) -> usize {
        depth_for(self.layers[0].len())
    }

    pub fn leaves(&self) -> &[Hash] {
        &self.layers[0]
    }

    pub fn leaf(&self, index: u64) -> Option<Hash> {
        self.layers[0].get(index as usize).copied()
    }

    /// Current root.
    pub fn root(&self) -> Hash {
        if self.is_empty() {
            return EMPTY_ROOT;
        }
        self.layers[self.depth()][0]
    }

    /// Append a leaf at position `len()` and return the new root.
    pub fn append(&mut self, leaf: Hash) -> Hash {
        self.layers[0].push(leaf);
        let index = self.layers[0].len() - 1;
        let depth = self.depth();

        for level in 1..=depth {
            if self.layers.len() <= level {
                self.layers.push(Vec::new());
            }
            let pos = index >> level;
            let children = &self.layers[level - 1];
            let left = children[2 * pos];
            let right = children
                .get(2 * pos + 1)
                .copied()
                .unwrap_or(self.zeros[level - 1]);
            let node = node_hash(&left, &right);

            let layer = &mut self.layers[level];
            if pos < layer.len() {
                layer[pos] = node;
            } else {
                layer.push(node);
            }
        }

        self.root()
    }

    /// Inclusion proof for the leaf at `index` against the current root.
    pub fn proof(&self, index: u64) -> Result<InclusionProof, CryptoError> {
        let len = self.len();
        if index >= len {
            return Err(CryptoError::IndexOutOfRange { index, len });
        }

        let depth = self.depth();
        let mut siblings = Vec::with_capacity(depth);
        let mut path_bits = Vec::with_capacity(depth);
        let mut pos = index as usize;
        for level in 0..depth {
            let sibling = self.layers[level]
                .get(pos ^ 1)
                .copied()
                .unwrap_or(self.zeros[level]);
            siblings.push(sibling);
            path_bits.push(pos & 1 == 1);
            pos >>= 1;
        }

        Ok(InclusionProof {
            leaf_index: index,
            leaf: self.layers[0][index as usize],
            siblings,
            path_bits,
            root: self.root(),
        })
    }

    /// Recompute the root from the leaves alone and compare with the cached nodes.
    pub fn verify_integrity(&self) -> Result<(), CryptoError> {
        let recomputed = compute_root(self.leaves());
        let cached = self.root();
        if recomputed == cached {
            Ok(())
        } else {
            Err(CryptoError::RootMismatch {
                cached: hex::encode(cached),
                recomputed: hex::encode(recomputed),
            })
        }
    }
}

impl Default for MerkleAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Root of an ordered leaf sequence, computed level by level from scratch.
pub fn compute_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return EMPTY_ROOT;
    }
    let zeros = zero_hashes();
    let depth = depth_for(leaves.len());
    let mut level: Vec<Hash> = leaves.to_vec();
    for height in 0..depth {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).copied().unwrap_or(zeros[height]);
                node_hash(&pair[0], &right)
            })
            .collect();
    }
    level[0]
}

/// Check an inclusion proof against its own root.
pub fn verify_proof(proof: &InclusionProof) -> bool {
    if proof.siblings.len() != proof.path_bits.len() || proof.siblings.len() > MAX_DEPTH {
        return false;
    }
    let mut current = proof.leaf;
    for (level, (sibling, is_right)) in proof.siblings.iter().zip(&proof.path_bits).enumerate() {
        if ((proof.leaf_index >> level) & 1 == 1) != *is_right {
            return false;
        }
        current = if *is_right {
            node_hash(sibling, &current)
        } else {
            node_hash(&current, sibling)
        };
    }
    if proof.leaf_index >> proof.siblings.len() != 0 {
        return false;
    }
    current == proof.root
}
