//! Plain value types exchanged with the (external) transport layer.
//!
//! The verification core consumes digests, byte strings and integers
//! only; mapping to and from the actual wire encoding happens outside it.
//! Proof objects a malicious or buggy server could omit stay `Option` and
//! their absence fails verification, it is never inferred as trivially
//! true.

use serde::{Deserialize, Serialize};

use vledger::entries::KvMetadata;
use vledger::htree::InclusionProof;
use vledger::{Digest, DualProof, TxHeader};

use crate::state::StateSignature;
use crate::Result;

/// One key-value write in a verifiable set request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KvWrite {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub metadata: Option<KvMetadata>,
}

impl KvWrite {
    pub fn new(key: &[u8], value: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            value: value.to_vec(),
            metadata: None,
        }
    }
}

/// A committed transaction as returned to a writer: the header plus the
/// digests of all its entries, enough to rebuild the entry tree locally.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxData {
    pub header: TxHeader,
    pub entry_digests: Vec<Digest>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifiableTx {
    pub tx: TxData,
    pub dual_proof: Option<DualProof>,
    /// Signature over the new state, when the server signs.
    pub signature: Option<StateSignature>,
}

/// A stored entry as returned to a reader.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub metadata: Option<KvMetadata>,
    /// Transaction that committed this entry.
    pub tx_id: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifiableEntry {
    pub entry: Entry,
    /// Inclusion of the entry within its transaction's entry tree.
    pub inclusion_proof: Option<InclusionProof>,
    /// Header of the transaction holding the entry.
    pub tx_header: TxHeader,
    pub dual_proof: Option<DualProof>,
    pub signature: Option<StateSignature>,
}

/// The verifiable operations of the excluded transport layer, reduced to
/// plain values. `prove_since_tx` is the caller's trusted anchor id; the
/// returned dual proof must bridge it to the operation's transaction.
pub trait LedgerRpc: Send + Sync {
    fn verifiable_set(&self, db: &str, kvs: &[KvWrite], prove_since_tx: u64)
        -> Result<VerifiableTx>;

    fn verifiable_get(&self, db: &str, key: &[u8], prove_since_tx: u64)
        -> Result<VerifiableEntry>;

    fn verifiable_set_reference(
        &self,
        db: &str,
        key: &[u8],
        referenced_key: &[u8],
        bound_tx: u64,
        prove_since_tx: u64,
    ) -> Result<VerifiableTx>;

    fn verifiable_zadd(
        &self,
        db: &str,
        set: &[u8],
        score: f64,
        key: &[u8],
        bound_tx: u64,
        prove_since_tx: u64,
    ) -> Result<VerifiableTx>;

    fn verifiable_tx_by_id(&self, db: &str, tx_id: u64, prove_since_tx: u64)
        -> Result<VerifiableTx>;
}
