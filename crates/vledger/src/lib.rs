//! Client-side verification core for a tamper-evident key-value ledger.
//!
//! A server asserts "this entry was committed at transaction T and the
//! ledger is consistent with what you saw before"; the modules here let a
//! client check that claim with nothing but hash computations over the
//! proof material in the response:
//!
//! - [`htree`]: the per-transaction binary Merkle tree over entry digests
//! - [`ahtree`]: the append-only history tree over transaction hashes
//! - [`linear`]: the accumulated-hash chain past the last history checkpoint
//! - [`dual`]: the combined end-to-end proof bridging two transactions
//! - [`entries`]: the canonical digest encoders for each entry kind

pub mod ahtree;
pub mod digest;
pub mod dual;
pub mod entries;
pub mod htree;
pub mod linear;
pub mod tx;

pub use digest::{leaf_digest, node_digest, sha256, Digest, LEAF_PREFIX, NODE_PREFIX};
pub use dual::{verify_dual_proof, DualProof};
pub use htree::{HTree, InclusionProof};
pub use linear::{verify_linear_proof, LinearProof};
pub use tx::TxHeader;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("tree requires at least one entry digest")]
    EmptyTree,

    #[error("tree capacity exceeded")]
    MaxWidthExceeded,

    #[error("leaf index out of range")]
    IndexOutOfRange,

    #[error("illegal argument: {0}")]
    IllegalArguments(&'static str),

    #[error("unsupported transaction header version {0}")]
    UnsupportedTxVersion(u16),
}

pub type Result<T> = std::result::Result<T, ProofError>;
