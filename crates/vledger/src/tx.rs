//! Transaction headers and accumulated-log-hash derivation.

use serde::{Deserialize, Serialize};

use crate::digest::{sha256, Digest};
use crate::{ProofError, Result};

/// Header of one committed transaction.
///
/// The accumulated log hash chains every header to all of its
/// predecessors: tampering with any prior transaction changes every
/// subsequent ALH, which is what the linear proof exploits.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxHeader {
    pub id: u64,
    pub prev_alh: Digest,
    pub ts: i64,
    pub version: u16,
    /// Opaque header metadata, folded into the inner hash as raw bytes.
    pub metadata: Option<Vec<u8>>,
    pub nentries: u32,
    /// Root of the transaction's entry tree.
    pub eh: Digest,
    /// History-tree checkpoint this transaction commits to.
    pub bl_tx_id: u64,
    pub bl_root: Digest,
}

impl TxHeader {
    /// Accumulated log hash: `H(id || prev_alh || inner_hash)`.
    pub fn alh(&self) -> Result<Digest> {
        let inner = self.inner_hash()?;
        let mut b = Vec::with_capacity(8 + 64);
        b.extend_from_slice(&self.id.to_be_bytes());
        b.extend_from_slice(&self.prev_alh);
        b.extend_from_slice(&inner);
        Ok(sha256(&b))
    }

    /// Digest of the header fields below the chain position; the linear
    /// proof carries one inner hash per bridged transaction.
    ///
    /// The layout is versioned and an unknown version is rejected before
    /// any byte is hashed.
    pub fn inner_hash(&self) -> Result<Digest> {
        let mut b = Vec::with_capacity(128);
        b.extend_from_slice(&self.ts.to_be_bytes());
        b.extend_from_slice(&self.version.to_be_bytes());
        match self.version {
            0 => b.extend_from_slice(&(self.nentries as u16).to_be_bytes()),
            1 => {
                let md = self.metadata.as_deref().unwrap_or(&[]);
                b.extend_from_slice(&(md.len() as u16).to_be_bytes());
                b.extend_from_slice(md);
                b.extend_from_slice(&self.nentries.to_be_bytes());
            }
            v => return Err(ProofError::UnsupportedTxVersion(v)),
        }
        b.extend_from_slice(&self.eh);
        b.extend_from_slice(&self.bl_tx_id.to_be_bytes());
        b.extend_from_slice(&self.bl_root);
        Ok(sha256(&b))
    }
}
