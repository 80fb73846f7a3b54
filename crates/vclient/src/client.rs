//! Operation-level verifiers.
//!
//! Every verifiable operation runs the same pipeline under its database's
//! lock: recompute the entry digest from our own data, check inclusion
//! into the target transaction's entry tree, check the dual proof against
//! the cached anchor, then commit the new trust state before returning.
//! A failure at any step aborts the call and leaves the previous anchor
//! authoritative.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use ed25519_dalek::VerifyingKey;
use tracing::{debug, warn};

use vledger::entries::{self, EntrySpec, KvMetadata};
use vledger::htree::{self, HTree};
use vledger::{verify_dual_proof, Digest, DualProof, TxHeader};

use crate::rpc::{KvWrite, LedgerRpc, VerifiableTx};
use crate::state::{StateSignature, StateStore, TrustState};
use crate::{ClientError, Result};

/// A successfully verified read.
#[derive(Clone, Debug)]
pub struct VerifiedEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub metadata: Option<KvMetadata>,
    pub tx_id: u64,
    pub verified: bool,
}

pub struct VerifiedClient<R: LedgerRpc, S: StateStore> {
    rpc: R,
    states: S,
    server_key: Option<VerifyingKey>,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl<R: LedgerRpc, S: StateStore> VerifiedClient<R, S> {
    pub fn new(rpc: R, states: S) -> Self {
        Self {
            rpc,
            states,
            server_key: None,
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Pin the server's state-signing key; every verified operation will
    /// then also require a valid signature over the new anchor.
    pub fn with_server_key(mut self, key: VerifyingKey) -> Self {
        self.server_key = Some(key);
        self
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    pub fn current_state(&self, db: &str) -> Result<TrustState> {
        Ok(self
            .states
            .load(db)?
            .unwrap_or_else(|| TrustState::initial(db)))
    }

    pub fn verified_set(&self, db: &str, key: &[u8], value: &[u8]) -> Result<TxHeader> {
        self.verified_set_all(db, &[KvWrite::new(key, value)])
    }

    /// Commit one transaction with the given writes and verify every one
    /// of them against the returned header.
    pub fn verified_set_all(&self, db: &str, kvs: &[KvWrite]) -> Result<TxHeader> {
        if kvs.is_empty() {
            return Err(ClientError::InvalidRequest("empty write set"));
        }

        let lock = self.lock_for(db);
        let _guard = lock.lock().unwrap();

        let state = self.current_state(db)?;
        let vtx = self.rpc.verifiable_set(db, kvs, state.tx_id)?;

        let specs: Vec<EntrySpec> = kvs
            .iter()
            .map(|kv| entries::encode_kv(&kv.key, kv.metadata.clone(), &kv.value))
            .collect();
        self.verify_write_tx(db, &state, &vtx, &specs)
    }

    pub fn verified_get(&self, db: &str, key: &[u8]) -> Result<VerifiedEntry> {
        let lock = self.lock_for(db);
        let _guard = lock.lock().unwrap();

        let state = self.current_state(db)?;
        let ve = self.rpc.verifiable_get(db, key, state.tx_id)?;
        let header = &ve.tx_header;

        let digest_fn = entries::entry_digest_for(header.version)?;

        if ve.entry.key != key {
            return Err(ClientError::MalformedProof("entry key mismatch"));
        }
        if ve.entry.tx_id != header.id {
            return Err(ClientError::MalformedProof(
                "entry bound to a different transaction",
            ));
        }
        let proof = ve
            .inclusion_proof
            .as_ref()
            .ok_or(ClientError::MalformedProof("missing inclusion proof"))?;

        // the digest is recomputed from the returned value, so a swapped
        // value cannot ride on an honest proof
        let spec = entries::encode_kv(&ve.entry.key, ve.entry.metadata.clone(), &ve.entry.value);
        if !htree::verify_inclusion(proof, &digest_fn(&spec), &header.eh) {
            warn!(tx = header.id, "read entry failed inclusion verification");
            return Err(ClientError::VerificationFailed(
                "entry not included in transaction",
            ));
        }

        let (tx_id, tx_hash) = self.check_dual_proof(&state, header, ve.dual_proof.as_ref())?;
        self.commit_state(db, tx_id, tx_hash, ve.signature.clone())?;

        Ok(VerifiedEntry {
            key: ve.entry.key,
            value: ve.entry.value,
            metadata: ve.entry.metadata,
            tx_id: ve.entry.tx_id,
            verified: true,
        })
    }

    pub fn verified_set_reference(
        &self,
        db: &str,
        key: &[u8],
        referenced_key: &[u8],
        bound_tx: u64,
    ) -> Result<TxHeader> {
        let lock = self.lock_for(db);
        let _guard = lock.lock().unwrap();

        let state = self.current_state(db)?;
        let vtx = self
            .rpc
            .verifiable_set_reference(db, key, referenced_key, bound_tx, state.tx_id)?;
        let spec = entries::encode_reference(key, referenced_key, bound_tx);
        self.verify_write_tx(db, &state, &vtx, std::slice::from_ref(&spec))
    }

    pub fn verified_zadd(
        &self,
        db: &str,
        set: &[u8],
        score: f64,
        key: &[u8],
        bound_tx: u64,
    ) -> Result<TxHeader> {
        let lock = self.lock_for(db);
        let _guard = lock.lock().unwrap();

        let state = self.current_state(db)?;
        let vtx = self
            .rpc
            .verifiable_zadd(db, set, score, key, bound_tx, state.tx_id)?;
        let spec = entries::encode_zadd(set, score, key, bound_tx);
        self.verify_write_tx(db, &state, &vtx, std::slice::from_ref(&spec))
    }

    /// Fetch a historical transaction header and fold it into the anchor.
    pub fn verified_tx_by_id(&self, db: &str, tx_id: u64) -> Result<TxHeader> {
        let lock = self.lock_for(db);
        let _guard = lock.lock().unwrap();

        let state = self.current_state(db)?;
        let vtx = self.rpc.verifiable_tx_by_id(db, tx_id, state.tx_id)?;
        let header = &vtx.tx.header;

        if header.id != tx_id {
            return Err(ClientError::MalformedProof("header id mismatch"));
        }
        entries::entry_digest_for(header.version)?;
        self.check_entry_tree(&vtx)?;

        let (new_id, new_hash) = self.check_dual_proof(&state, header, vtx.dual_proof.as_ref())?;
        self.commit_state(db, new_id, new_hash, vtx.signature.clone())?;
        Ok(header.clone())
    }

    // Shared tail of the write operations: inclusion of every written
    // entry, then the dual proof, then the anchor update.
    fn verify_write_tx(
        &self,
        db: &str,
        state: &TrustState,
        vtx: &VerifiableTx,
        specs: &[EntrySpec],
    ) -> Result<TxHeader> {
        let header = &vtx.tx.header;
        let digest_fn = entries::entry_digest_for(header.version)?;

        if specs.len() != vtx.tx.entry_digests.len() {
            return Err(ClientError::MalformedProof("entry digest count mismatch"));
        }
        let tree = self.check_entry_tree(vtx)?;

        for (i, spec) in specs.iter().enumerate() {
            let proof = tree.inclusion_proof(i)?;
            if !htree::verify_inclusion(&proof, &digest_fn(spec), &header.eh) {
                warn!(tx = header.id, entry = i, "written entry failed inclusion verification");
                return Err(ClientError::VerificationFailed(
                    "entry not included in transaction",
                ));
            }
        }

        let (tx_id, tx_hash) = self.check_dual_proof(state, header, vtx.dual_proof.as_ref())?;
        self.commit_state(db, tx_id, tx_hash, vtx.signature.clone())?;
        Ok(header.clone())
    }

    fn check_entry_tree(&self, vtx: &VerifiableTx) -> Result<HTree> {
        let header = &vtx.tx.header;
        if vtx.tx.entry_digests.len() != header.nentries as usize {
            return Err(ClientError::MalformedProof(
                "entry digest count does not match header",
            ));
        }
        let mut tree = HTree::new(vtx.tx.entry_digests.len())?;
        tree.build_with(&vtx.tx.entry_digests)?;
        if tree.root()? != header.eh {
            return Err(ClientError::VerificationFailed(
                "entry tree root does not match header",
            ));
        }
        Ok(tree)
    }

    // Returns the (tx_id, tx_hash) pair the new trust state must carry:
    // the max end of the verified bridge. Reading an entry older than the
    // anchor therefore leaves the anchor where it was.
    fn check_dual_proof(
        &self,
        state: &TrustState,
        target: &TxHeader,
        proof: Option<&DualProof>,
    ) -> Result<(u64, Digest)> {
        let target_alh = target.alh()?;

        if state.tx_id == 0 {
            // nothing trusted yet; the first verified operation seeds the
            // anchor without a bridge to check against
            return Ok((target.id, target_alh));
        }

        let proof = proof.ok_or(ClientError::MalformedProof("missing dual proof"))?;

        let (source_id, source_alh, target_id, target_alh) = if state.tx_id <= target.id {
            (state.tx_id, state.tx_hash, target.id, target_alh)
        } else {
            (target.id, target_alh, state.tx_id, state.tx_hash)
        };

        if !verify_dual_proof(proof, source_id, target_id, &source_alh, &target_alh) {
            warn!(source = source_id, target = target_id, "dual proof rejected");
            return Err(ClientError::VerificationFailed("dual proof rejected"));
        }

        Ok((target_id, target_alh))
    }

    // Update-then-return: the anchor is committed before any result
    // reaches the caller, so a returned success always reflects the
    // stored state.
    fn commit_state(
        &self,
        db: &str,
        tx_id: u64,
        tx_hash: Digest,
        signature: Option<StateSignature>,
    ) -> Result<()> {
        let new = TrustState {
            db: db.to_string(),
            tx_id,
            tx_hash,
            signature,
        };
        if let Some(vk) = &self.server_key {
            if !new.verify_signature(vk) {
                return Err(ClientError::VerificationFailed("state signature rejected"));
            }
        }
        debug!(db = %new.db, tx_id = new.tx_id, "trust state advanced");
        self.states.save(&new)
    }

    // One mutex per database identity, held across read-verify-write so
    // concurrent operations cannot race the anchor.
    fn lock_for(&self, db: &str) -> Arc<Mutex<()>> {
        if let Some(l) = self.locks.read().unwrap().get(db) {
            return l.clone();
        }
        self.locks
            .write()
            .unwrap()
            .entry(db.to_string())
            .or_default()
            .clone()
    }
}
