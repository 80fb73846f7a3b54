//! In-memory ledger implementing the server side of the protocol.
//!
//! Commits real transactions — entry tree, ALH chain, history-tree
//! checkpoints — and produces the proofs the verifiers expect, so the
//! whole verification pipeline can be exercised without a server. Serves
//! one logical database; the name passed to the RPC methods is only
//! echoed into the state signature. Tamper hooks cover the failure paths
//! the integration tests need.

use std::collections::HashMap;
use std::sync::Mutex;

use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use rand_core::OsRng;

use vledger::ahtree::AHTree;
use vledger::entries::{self, EntrySpec};
use vledger::htree::HTree;
use vledger::linear::LinearProof;
use vledger::{Digest, DualProof, TxHeader};

use crate::rpc::{Entry, KvWrite, LedgerRpc, TxData, VerifiableEntry, VerifiableTx};
use crate::state::{StateSignature, TrustState};
use crate::{ClientError, Result};

const TS_BASE: i64 = 1_700_000_000;

struct TxRecord {
    header: TxHeader,
    entries: Vec<EntrySpec>,
    entry_digests: Vec<Digest>,
    alh: Digest,
    inner_hash: Digest,
}

#[derive(Default)]
struct MockInner {
    /// txs[n - 1] holds transaction n
    txs: Vec<TxRecord>,
    aht: AHTree,
    /// encoded key -> (tx id, entry index) of the latest write
    index: HashMap<Vec<u8>, (u64, usize)>,
    corrupt_next_dual_proof: bool,
    skewed_digest_version: Option<u16>,
}

pub struct MockLedger {
    inner: Mutex<MockInner>,
    version: u16,
    signing_key: Option<SigningKey>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self::with_version(1)
    }

    /// Ledger committing headers (and entry digests) at the given version.
    pub fn with_version(version: u16) -> Self {
        Self {
            inner: Mutex::new(MockInner::default()),
            version,
            signing_key: None,
        }
    }

    /// Enable state signing with a freshly generated key.
    pub fn signing(mut self) -> Self {
        self.signing_key = Some(SigningKey::generate(&mut OsRng));
        self
    }

    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        self.signing_key.as_ref().map(|k| k.verifying_key())
    }

    pub fn tx_count(&self) -> u64 {
        self.inner.lock().unwrap().txs.len() as u64
    }

    /// Corrupt the linear proof of the next response.
    pub fn corrupt_next_dual_proof(&self) {
        self.inner.lock().unwrap().corrupt_next_dual_proof = true;
    }

    /// Compute the next transaction's entry digests with a different
    /// version than the one declared in its header.
    pub fn skew_digest_version_once(&self, version: u16) {
        self.inner.lock().unwrap().skewed_digest_version = Some(version);
    }

    /// Flip one byte of a stored value after the fact, leaving the
    /// committed digests untouched, like a disk-level modification.
    pub fn tamper_stored_value(&self, key: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let encoded = entries::encode_key(key);
        let Some(&(tx_id, idx)) = inner.index.get(&encoded) else {
            return false;
        };
        let value = &mut inner.txs[(tx_id - 1) as usize].entries[idx].value;
        match value.last_mut() {
            Some(b) => {
                *b ^= 0x01;
                true
            }
            None => false,
        }
    }

    fn sign_state(&self, db: &str, tx_id: u64, tx_hash: Digest) -> Option<StateSignature> {
        let key = self.signing_key.as_ref()?;
        let state = TrustState {
            db: db.to_string(),
            tx_id,
            tx_hash,
            signature: None,
        };
        let sig = key.sign(&state.signed_payload());
        Some(StateSignature {
            public_key: key.verifying_key().to_bytes(),
            signature: sig.to_bytes().to_vec(),
        })
    }

    fn build_verifiable_tx(
        &self,
        inner: &mut MockInner,
        db: &str,
        id: u64,
        since: u64,
    ) -> Result<VerifiableTx> {
        let (dual, target, target_alh) = inner.dual_proof_for(since, id)?;
        let rec = &inner.txs[(id - 1) as usize];
        Ok(VerifiableTx {
            tx: TxData {
                header: rec.header.clone(),
                entry_digests: rec.entry_digests.clone(),
            },
            dual_proof: Some(dual),
            signature: self.sign_state(db, target, target_alh),
        })
    }
}

impl MockInner {
    fn commit(
        &mut self,
        entries: Vec<EntrySpec>,
        header_version: u16,
        digest_version: u16,
    ) -> Result<u64> {
        let digest_fn = entries::entry_digest_for(digest_version)?;
        let entry_digests: Vec<Digest> = entries.iter().map(digest_fn).collect();

        let mut tree = HTree::new(entry_digests.len())?;
        tree.build_with(&entry_digests)?;

        let id = self.txs.len() as u64 + 1;
        let bl_tx_id = id - 1;
        let header = TxHeader {
            id,
            prev_alh: self.txs.last().map(|t| t.alh).unwrap_or([0u8; 32]),
            ts: TS_BASE + id as i64,
            version: header_version,
            metadata: None,
            nentries: entries.len() as u32,
            eh: tree.root()?,
            bl_tx_id,
            bl_root: if bl_tx_id > 0 {
                self.aht.root_at(bl_tx_id)?
            } else {
                [0u8; 32]
            },
        };
        let alh = header.alh()?;
        let inner_hash = header.inner_hash()?;

        for (idx, e) in entries.iter().enumerate() {
            self.index.insert(e.key.clone(), (id, idx));
        }

        self.aht.append(&alh);
        self.txs.push(TxRecord {
            header,
            entries,
            entry_digests,
            alh,
            inner_hash,
        });
        Ok(id)
    }

    fn linear_proof(&self, source: u64, target: u64) -> LinearProof {
        let mut terms = vec![self.txs[(source - 1) as usize].alh];
        for id in source + 1..=target {
            terms.push(self.txs[(id - 1) as usize].inner_hash);
        }
        LinearProof {
            source_tx_id: source,
            target_tx_id: target,
            terms,
        }
    }

    fn dual_proof(&self, source: u64, target: u64) -> Result<DualProof> {
        let source_hdr = self.txs[(source - 1) as usize].header.clone();
        let target_hdr = self.txs[(target - 1) as usize].header.clone();

        let inclusion_proof = if source < target_hdr.bl_tx_id {
            self.aht.inclusion_proof(source, target_hdr.bl_tx_id)?
        } else {
            Vec::new()
        };
        let consistency_proof = if source_hdr.bl_tx_id > 0 {
            self.aht
                .consistency_proof(source_hdr.bl_tx_id, target_hdr.bl_tx_id)?
        } else {
            Vec::new()
        };
        let (target_bl_tx_alh, last_inclusion_proof) = if target_hdr.bl_tx_id > 0 {
            (
                self.txs[(target_hdr.bl_tx_id - 1) as usize].alh,
                self.aht.last_inclusion_proof(target_hdr.bl_tx_id)?,
            )
        } else {
            ([0u8; 32], Vec::new())
        };
        let linear_proof = if source < target_hdr.bl_tx_id {
            self.linear_proof(target_hdr.bl_tx_id, target)
        } else {
            self.linear_proof(source, target)
        };

        Ok(DualProof {
            source_tx_header: source_hdr,
            target_tx_header: target_hdr,
            inclusion_proof,
            consistency_proof,
            target_bl_tx_alh,
            last_inclusion_proof,
            linear_proof: Some(linear_proof),
        })
    }

    // Bridge endpoints for a response: the anchor and the operation's
    // transaction, in id order; a zero anchor degenerates to the target
    // alone.
    fn dual_proof_for(&mut self, since: u64, tx_id: u64) -> Result<(DualProof, u64, Digest)> {
        let (source, target) = if since == 0 {
            (tx_id, tx_id)
        } else {
            (since.min(tx_id), since.max(tx_id))
        };
        let mut dual = self.dual_proof(source, target)?;
        if self.corrupt_next_dual_proof {
            self.corrupt_next_dual_proof = false;
            corrupt_linear(&mut dual);
        }
        let target_alh = self.txs[(target - 1) as usize].alh;
        Ok((dual, target, target_alh))
    }
}

fn corrupt_linear(dual: &mut DualProof) {
    if let Some(lp) = dual.linear_proof.as_mut() {
        if let Some(term) = lp.terms.last_mut() {
            term[0] ^= 0x01;
        }
    }
}

impl LedgerRpc for MockLedger {
    fn verifiable_set(
        &self,
        db: &str,
        kvs: &[KvWrite],
        prove_since_tx: u64,
    ) -> Result<VerifiableTx> {
        if kvs.is_empty() {
            return Err(ClientError::Transport("empty write set".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        let specs: Vec<EntrySpec> = kvs
            .iter()
            .map(|kv| entries::encode_kv(&kv.key, kv.metadata.clone(), &kv.value))
            .collect();
        let digest_version = inner.skewed_digest_version.take().unwrap_or(self.version);
        let id = inner.commit(specs, self.version, digest_version)?;
        self.build_verifiable_tx(&mut inner, db, id, prove_since_tx)
    }

    fn verifiable_get(
        &self,
        db: &str,
        key: &[u8],
        prove_since_tx: u64,
    ) -> Result<VerifiableEntry> {
        let mut inner = self.inner.lock().unwrap();
        let encoded = entries::encode_key(key);
        let (tx_id, idx) = *inner
            .index
            .get(&encoded)
            .ok_or_else(|| ClientError::Transport("key not found".into()))?;

        let (tx_header, entry_digests, spec) = {
            let rec = &inner.txs[(tx_id - 1) as usize];
            (
                rec.header.clone(),
                rec.entry_digests.clone(),
                rec.entries[idx].clone(),
            )
        };
        if spec.value.first() != Some(&entries::PLAIN_VALUE_PREFIX) {
            return Err(ClientError::Transport("entry is not a plain value".into()));
        }

        let mut tree = HTree::new(entry_digests.len())?;
        tree.build_with(&entry_digests)?;
        let inclusion_proof = tree.inclusion_proof(idx)?;

        let (dual, target, target_alh) = inner.dual_proof_for(prove_since_tx, tx_id)?;

        Ok(VerifiableEntry {
            entry: Entry {
                key: key.to_vec(),
                value: spec.value[1..].to_vec(),
                metadata: spec.metadata.clone(),
                tx_id,
            },
            inclusion_proof: Some(inclusion_proof),
            tx_header,
            dual_proof: Some(dual),
            signature: self.sign_state(db, target, target_alh),
        })
    }

    fn verifiable_set_reference(
        &self,
        db: &str,
        key: &[u8],
        referenced_key: &[u8],
        bound_tx: u64,
        prove_since_tx: u64,
    ) -> Result<VerifiableTx> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.index.contains_key(&entries::encode_key(referenced_key)) {
            return Err(ClientError::Transport("referenced key not found".into()));
        }
        let spec = entries::encode_reference(key, referenced_key, bound_tx);
        let digest_version = inner.skewed_digest_version.take().unwrap_or(self.version);
        let id = inner.commit(vec![spec], self.version, digest_version)?;
        self.build_verifiable_tx(&mut inner, db, id, prove_since_tx)
    }

    fn verifiable_zadd(
        &self,
        db: &str,
        set: &[u8],
        score: f64,
        key: &[u8],
        bound_tx: u64,
        prove_since_tx: u64,
    ) -> Result<VerifiableTx> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.index.contains_key(&entries::encode_key(key)) {
            return Err(ClientError::Transport("element key not found".into()));
        }
        let spec = entries::encode_zadd(set, score, key, bound_tx);
        let digest_version = inner.skewed_digest_version.take().unwrap_or(self.version);
        let id = inner.commit(vec![spec], self.version, digest_version)?;
        self.build_verifiable_tx(&mut inner, db, id, prove_since_tx)
    }

    fn verifiable_tx_by_id(
        &self,
        db: &str,
        tx_id: u64,
        prove_since_tx: u64,
    ) -> Result<VerifiableTx> {
        let mut inner = self.inner.lock().unwrap();
        if tx_id == 0 || tx_id > inner.txs.len() as u64 {
            return Err(ClientError::Transport("transaction not found".into()));
        }
        self.build_verifiable_tx(&mut inner, db, tx_id, prove_since_tx)
    }
}
