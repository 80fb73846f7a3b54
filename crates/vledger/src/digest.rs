//! Domain-separated digest primitives.
//!
//! A single tag byte is prepended before hashing so leaf digests and
//! inner-node digests live in disjoint hash spaces; a second preimage at
//! one tree level cannot be replayed at another.

use sha2::{Digest as _, Sha256};

/// 32-byte SHA-256 digest
pub type Digest = [u8; 32];

pub const DIGEST_SIZE: usize = 32;

/// Tag byte for leaf hashing
pub const LEAF_PREFIX: u8 = 0x00;
/// Tag byte for inner-node hashing
pub const NODE_PREFIX: u8 = 0x01;

pub fn sha256(data: &[u8]) -> Digest {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().into()
}

/// leaf = H(0x00 || data)
pub fn leaf_digest(data: &[u8]) -> Digest {
    let mut h = Sha256::new();
    h.update([LEAF_PREFIX]);
    h.update(data);
    h.finalize().into()
}

/// node = H(0x01 || left || right)
pub fn node_digest(left: &Digest, right: &Digest) -> Digest {
    let mut h = Sha256::new();
    h.update([NODE_PREFIX]);
    h.update(left);
    h.update(right);
    h.finalize().into()
}
