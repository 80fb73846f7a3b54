//! Canonical digest input for the three entry kinds.
//!
//! The client must reproduce exactly the bytes the server hashed when it
//! built the transaction's entry tree. The digest layout is versioned by
//! the transaction header and the encoders are not interchangeable:
//! hashing with the wrong version reads as tampering.

use serde::{Deserialize, Serialize};

use crate::digest::{sha256, Digest};
use crate::{ProofError, Result};

/// Prefix for plain keys in the main index.
pub const SET_KEY_PREFIX: u8 = 0x00;
/// Prefix for sorted-set keys.
pub const SORTED_SET_KEY_PREFIX: u8 = 0x01;
/// Tag for a stored plain value.
pub const PLAIN_VALUE_PREFIX: u8 = 0x00;
/// Tag for a stored reference to another key.
pub const REFERENCE_VALUE_PREFIX: u8 = 0x01;

const DELETED_ATTR_CODE: u8 = 0x00;
const EXPIRES_AT_ATTR_CODE: u8 = 0x01;
const NON_INDEXABLE_ATTR_CODE: u8 = 0x02;

/// Per-entry metadata.
///
/// Byte serialization is deterministic: attributes are emitted in fixed
/// code order and absent attributes contribute nothing, not a
/// placeholder.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KvMetadata {
    pub deleted: bool,
    /// Expiration as epoch seconds.
    pub expires_at: Option<i64>,
    pub non_indexable: bool,
}

impl KvMetadata {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::new();
        if self.deleted {
            b.push(DELETED_ATTR_CODE);
        }
        if let Some(at) = self.expires_at {
            b.push(EXPIRES_AT_ATTR_CODE);
            b.extend_from_slice(&at.to_be_bytes());
        }
        if self.non_indexable {
            b.push(NON_INDEXABLE_ATTR_CODE);
        }
        b
    }

    pub fn is_empty(&self) -> bool {
        !self.deleted && self.expires_at.is_none() && !self.non_indexable
    }
}

/// One entry exactly as the server hashed it: key and value already carry
/// their storage prefixes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntrySpec {
    pub key: Vec<u8>,
    pub metadata: Option<KvMetadata>,
    pub value: Vec<u8>,
}

pub type EntryDigestFn = fn(&EntrySpec) -> Digest;

/// Digest encoder for the given header version; never defaults.
pub fn entry_digest_for(version: u16) -> Result<EntryDigestFn> {
    match version {
        0 => Ok(entry_digest_v0),
        1 => Ok(entry_digest_v1),
        v => Err(ProofError::UnsupportedTxVersion(v)),
    }
}

/// v0: `H(key || H(value))`, metadata ignored.
pub fn entry_digest_v0(e: &EntrySpec) -> Digest {
    let mut b = Vec::with_capacity(e.key.len() + 32);
    b.extend_from_slice(&e.key);
    b.extend_from_slice(&sha256(&e.value));
    sha256(&b)
}

/// v1: length-prefixed metadata and key ahead of the value hash.
pub fn entry_digest_v1(e: &EntrySpec) -> Digest {
    let md = e.metadata.as_ref().map(|m| m.to_bytes()).unwrap_or_default();
    let mut b = Vec::with_capacity(2 + md.len() + 2 + e.key.len() + 32);
    b.extend_from_slice(&(md.len() as u16).to_be_bytes());
    b.extend_from_slice(&md);
    b.extend_from_slice(&(e.key.len() as u16).to_be_bytes());
    b.extend_from_slice(&e.key);
    b.extend_from_slice(&sha256(&e.value));
    sha256(&b)
}

/// Plain key as stored in the main index.
pub fn encode_key(key: &[u8]) -> Vec<u8> {
    wrap_with_prefix(SET_KEY_PREFIX, key)
}

/// Plain key-value entry.
pub fn encode_kv(key: &[u8], metadata: Option<KvMetadata>, value: &[u8]) -> EntrySpec {
    EntrySpec {
        key: encode_key(key),
        metadata,
        value: wrap_with_prefix(PLAIN_VALUE_PREFIX, value),
    }
}

/// Reference entry: the value binds the referenced key and the resolving
/// transaction.
pub fn encode_reference(key: &[u8], referenced_key: &[u8], bound_tx: u64) -> EntrySpec {
    let ref_key = encode_key(referenced_key);
    let mut value = Vec::with_capacity(1 + 8 + ref_key.len());
    value.push(REFERENCE_VALUE_PREFIX);
    value.extend_from_slice(&bound_tx.to_be_bytes());
    value.extend_from_slice(&ref_key);
    EntrySpec {
        key: encode_key(key),
        metadata: None,
        value,
    }
}

/// Sorted-set entry: the whole tuple lives in the key, the value is
/// empty.
pub fn encode_zadd(set: &[u8], score: f64, key: &[u8], bound_tx: u64) -> EntrySpec {
    let ekey = encode_key(key);
    let mut zkey = Vec::with_capacity(1 + 8 + set.len() + 8 + 8 + ekey.len() + 8);
    zkey.push(SORTED_SET_KEY_PREFIX);
    zkey.extend_from_slice(&(set.len() as u64).to_be_bytes());
    zkey.extend_from_slice(set);
    zkey.extend_from_slice(&score.to_bits().to_be_bytes());
    zkey.extend_from_slice(&(ekey.len() as u64).to_be_bytes());
    zkey.extend_from_slice(&ekey);
    zkey.extend_from_slice(&bound_tx.to_be_bytes());
    EntrySpec {
        key: zkey,
        metadata: None,
        value: Vec::new(),
    }
}

fn wrap_with_prefix(prefix: u8, data: &[u8]) -> Vec<u8> {
    let mut b = Vec::with_capacity(1 + data.len());
    b.push(prefix);
    b.extend_from_slice(data);
    b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_bytes_follow_attribute_code_order() {
        let md = KvMetadata {
            deleted: true,
            expires_at: Some(0x0102030405060708),
            non_indexable: true,
        };
        assert_eq!(
            md.to_bytes(),
            vec![0x00, 0x01, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x02]
        );
    }

    #[test]
    fn absent_attributes_contribute_nothing() {
        assert!(KvMetadata::default().to_bytes().is_empty());
        assert_eq!(
            KvMetadata { deleted: true, ..Default::default() }.to_bytes(),
            vec![0x00]
        );
        assert_eq!(
            KvMetadata { non_indexable: true, ..Default::default() }.to_bytes(),
            vec![0x02]
        );
    }

    #[test]
    fn v0_digest_matches_manual_fold() {
        let e = encode_kv(b"k1", None, b"v1");
        let mut b = Vec::new();
        b.extend_from_slice(&e.key);
        b.extend_from_slice(&sha256(&e.value));
        assert_eq!(entry_digest_v0(&e), sha256(&b));
    }

    #[test]
    fn versions_differ_when_metadata_present() {
        let md = KvMetadata { deleted: true, ..Default::default() };
        let e = encode_kv(b"k1", Some(md), b"v1");
        assert_ne!(entry_digest_v0(&e), entry_digest_v1(&e));
    }

    #[test]
    fn versions_differ_even_without_metadata() {
        // v1 length-prefixes the key, so the layouts never collide
        let e = encode_kv(b"k1", None, b"v1");
        assert_ne!(entry_digest_v0(&e), entry_digest_v1(&e));
    }

    #[test]
    fn cross_version_verification_fails() {
        let md = KvMetadata { expires_at: Some(1_700_000_000), ..Default::default() };
        let e = encode_kv(b"k1", Some(md), b"v1");
        let v1 = entry_digest_for(1).unwrap()(&e);
        let v0 = entry_digest_for(0).unwrap()(&e);
        assert_ne!(v0, v1);
    }

    #[test]
    fn unknown_version_has_no_encoder() {
        assert_eq!(
            entry_digest_for(2).unwrap_err(),
            ProofError::UnsupportedTxVersion(2)
        );
    }

    #[test]
    fn plain_keys_and_values_are_tagged() {
        let e = encode_kv(b"k", None, b"v");
        assert_eq!(e.key, vec![SET_KEY_PREFIX, b'k']);
        assert_eq!(e.value, vec![PLAIN_VALUE_PREFIX, b'v']);
    }

    #[test]
    fn reference_value_layout() {
        let e = encode_reference(b"alias", b"k1", 7);
        assert_eq!(e.key, encode_key(b"alias"));

        let mut expected = vec![REFERENCE_VALUE_PREFIX];
        expected.extend_from_slice(&7u64.to_be_bytes());
        expected.extend_from_slice(&encode_key(b"k1"));
        assert_eq!(e.value, expected);
    }

    #[test]
    fn zadd_key_layout() {
        let e = encode_zadd(b"ranking", 2.5, b"k1", 3);
        assert!(e.value.is_empty());

        let ekey = encode_key(b"k1");
        let mut expected = vec![SORTED_SET_KEY_PREFIX];
        expected.extend_from_slice(&(b"ranking".len() as u64).to_be_bytes());
        expected.extend_from_slice(b"ranking");
        expected.extend_from_slice(&2.5f64.to_bits().to_be_bytes());
        expected.extend_from_slice(&(ekey.len() as u64).to_be_bytes());
        expected.extend_from_slice(&ekey);
        expected.extend_from_slice(&3u64.to_be_bytes());
        assert_eq!(e.key, expected);
    }

    #[test]
    fn zadd_score_changes_the_key() {
        assert_ne!(
            encode_zadd(b"s", 1.0, b"k", 1).key,
            encode_zadd(b"s", 2.0, b"k", 1).key
        );
    }
}
