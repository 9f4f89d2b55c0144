/// BLAKE3 hash (32 bytes).
pub type Hash = [u8; 32];

/// Domain tag prefixed to leaf preimages.
const LEAF_TAG: u8 = 0x00;
/// Domain tag prefixed to interior-node preimages.
const NODE_TAG: u8 = 0x01;

/// Hash arbitrary data using BLAKE3.
pub fn hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Leaf hash of a nullifier: H(0x00 || nullifier).
pub fn leaf_hash(nullifier: &[u8; 32]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_TAG]);
    hasher.update(nullifier);
    *hasher.finalize().as_bytes()
}

/// Interior node: H(0x01 || left || right).
pub fn node_hash(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_TAG]);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// Hex-encoded BLAKE3 digest, used as a content address.
pub fn content_address(data: &[u8]) -> String {
    hex::encode(hash(data))
}
