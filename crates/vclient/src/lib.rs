//! Trust-state management and operation-level verification for a
//! tamper-evident key-value ledger.
//!
//! Wraps the pure proof math of `vledger` into verified operations: each
//! call recomputes the entry digest, checks inclusion into the target
//! transaction, checks the dual proof against the locally cached trust
//! anchor, and only then advances the anchor. A verification failure is a
//! hard error and never touches the stored state.

pub mod client;
pub mod mock;
pub mod rpc;
pub mod state;

pub use client::{VerifiedClient, VerifiedEntry};
pub use mock::MockLedger;
pub use rpc::{Entry, KvWrite, LedgerRpc, TxData, VerifiableEntry, VerifiableTx};
pub use state::{FileStateStore, InMemoryStateStore, StateSignature, StateStore, TrustState};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// A recomputed digest or root does not match the claimed value. The
    /// store may be corrupted or compromised; retrying cannot fix a hash
    /// mismatch.
    #[error("verification failed: {0}")]
    VerificationFailed(&'static str),

    /// Structurally incomplete proof material (missing header, missing
    /// proof object, mismatched ids). Treated exactly like a failed
    /// verification for trust purposes.
    #[error("malformed proof: {0}")]
    MalformedProof(&'static str),

    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    #[error(transparent)]
    Proof(#[from] vledger::ProofError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("state store error: {0}")]
    StateStore(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
