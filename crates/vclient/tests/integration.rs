use std::sync::Arc;
use std::thread;

use vclient::{
    ClientError, FileStateStore, InMemoryStateStore, KvWrite, LedgerRpc, MockLedger,
    StateStore, VerifiableEntry, VerifiableTx, VerifiedClient,
};

const DB: &str = "defaultdb";

fn client() -> VerifiedClient<MockLedger, InMemoryStateStore> {
    VerifiedClient::new(MockLedger::new(), InMemoryStateStore::new())
}

#[test]
fn end_to_end_three_transactions() {
    let c = client();

    assert_eq!(c.current_state(DB).unwrap().tx_id, 0);

    let mut seen = Vec::new();
    for (k, v) in [(b"k1", b"v1"), (b"k2", b"v2"), (b"k3", b"v3")] {
        let header = c.verified_set(DB, k, v).unwrap();
        let state = c.current_state(DB).unwrap();
        assert_eq!(state.tx_id, header.id);
        seen.push(state.tx_id);
    }
    assert_eq!(seen, vec![1, 2, 3]);

    let entry = c.verified_get(DB, b"k1").unwrap();
    assert!(entry.verified);
    assert_eq!(entry.value, b"v1");
    assert_eq!(entry.tx_id, 1);
    // reading old history must not regress the anchor
    assert_eq!(c.current_state(DB).unwrap().tx_id, 3);
}

#[test]
fn repeated_get_is_idempotent() {
    let c = client();
    c.verified_set(DB, b"k1", b"v1").unwrap();
    c.verified_set(DB, b"k2", b"v2").unwrap();

    let first = c.verified_get(DB, b"k1").unwrap();
    let state_after_first = c.current_state(DB).unwrap();

    let second = c.verified_get(DB, b"k1").unwrap();
    let state_after_second = c.current_state(DB).unwrap();

    assert_eq!(first.value, second.value);
    assert_eq!(state_after_first, state_after_second);
}

#[test]
fn multi_kv_set_verifies_every_entry() {
    let c = client();
    let kvs: Vec<KvWrite> = (0..5)
        .map(|i| KvWrite::new(format!("k{i}").as_bytes(), format!("v{i}").as_bytes()))
        .collect();
    let header = c.verified_set_all(DB, &kvs).unwrap();
    assert_eq!(header.nentries, 5);

    for i in 0..5 {
        let e = c.verified_get(DB, format!("k{i}").as_bytes()).unwrap();
        assert_eq!(e.value, format!("v{i}").as_bytes());
    }
}

#[test]
fn tampered_stored_value_is_detected() {
    let c = client();
    c.verified_set(DB, b"k1", b"v1").unwrap();
    c.verified_set(DB, b"k2", b"v2").unwrap();
    let before = c.current_state(DB).unwrap();

    assert!(c.rpc().tamper_stored_value(b"k1"));

    match c.verified_get(DB, b"k1") {
        Err(ClientError::VerificationFailed(_)) => {}
        other => panic!("expected verification failure, got {other:?}"),
    }
    // failed verification must not touch the anchor
    assert_eq!(c.current_state(DB).unwrap(), before);
}

#[test]
fn corrupted_dual_proof_is_detected() {
    let c = client();
    c.verified_set(DB, b"k1", b"v1").unwrap();
    let before = c.current_state(DB).unwrap();

    c.rpc().corrupt_next_dual_proof();
    match c.verified_set(DB, b"k2", b"v2") {
        Err(ClientError::VerificationFailed(_)) => {}
        other => panic!("expected verification failure, got {other:?}"),
    }
    assert_eq!(c.current_state(DB).unwrap(), before);

    // the server state is fine; the next honest response verifies
    c.verified_set(DB, b"k3", b"v3").unwrap();
}

#[test]
fn digest_version_skew_is_detected() {
    let c = client();
    c.verified_set(DB, b"k1", b"v1").unwrap();

    // server hashes the next transaction with v0 while declaring v1
    c.rpc().skew_digest_version_once(0);
    match c.verified_set(DB, b"k2", b"v2") {
        Err(ClientError::VerificationFailed(_)) => {}
        other => panic!("expected verification failure, got {other:?}"),
    }
}

#[test]
fn v0_headers_verify_with_the_v0_encoder() {
    let c = VerifiedClient::new(MockLedger::with_version(0), InMemoryStateStore::new());
    c.verified_set(DB, b"k1", b"v1").unwrap();
    let e = c.verified_get(DB, b"k1").unwrap();
    assert_eq!(e.value, b"v1");
    assert_eq!(c.current_state(DB).unwrap().tx_id, 1);
}

#[test]
fn verified_reference_and_zadd() {
    let c = client();
    let h1 = c.verified_set(DB, b"k1", b"v1").unwrap();

    let h2 = c
        .verified_set_reference(DB, b"alias", b"k1", h1.id)
        .unwrap();
    assert_eq!(c.current_state(DB).unwrap().tx_id, h2.id);

    let h3 = c.verified_zadd(DB, b"ranking", 0.5, b"k1", h1.id).unwrap();
    assert_eq!(c.current_state(DB).unwrap().tx_id, h3.id);
}

#[test]
fn verified_tx_by_id_checks_old_history() {
    let c = client();
    for i in 0..6u8 {
        c.verified_set(DB, &[b'k', i], &[b'v', i]).unwrap();
    }

    let header = c.verified_tx_by_id(DB, 2).unwrap();
    assert_eq!(header.id, 2);
    assert_eq!(c.current_state(DB).unwrap().tx_id, 6);
}

#[test]
fn unknown_key_is_a_transport_error() {
    let c = client();
    c.verified_set(DB, b"k1", b"v1").unwrap();
    match c.verified_get(DB, b"missing") {
        Err(ClientError::Transport(_)) => {}
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[test]
fn signed_states_verify_against_the_pinned_key() {
    let ledger = MockLedger::new().signing();
    let vk = ledger.verifying_key().unwrap();
    let c = VerifiedClient::new(ledger, InMemoryStateStore::new()).with_server_key(vk);

    c.verified_set(DB, b"k1", b"v1").unwrap();
    let state = c.current_state(DB).unwrap();
    assert!(state.signature.is_some());
    assert!(state.verify_signature(&vk));
}

#[test]
fn unsigned_response_fails_when_a_key_is_pinned() {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    let other = SigningKey::generate(&mut OsRng).verifying_key();
    let c = VerifiedClient::new(MockLedger::new(), InMemoryStateStore::new())
        .with_server_key(other);

    match c.verified_set(DB, b"k1", b"v1") {
        Err(ClientError::VerificationFailed(_)) => {}
        other => panic!("expected verification failure, got {other:?}"),
    }
    assert_eq!(c.current_state(DB).unwrap().tx_id, 0);
}

// Transport wrapper rewriting read responses, for the malformed and
// version-skew paths a well-behaved mock never produces.
struct MapGetRpc {
    inner: MockLedger,
    rewrite: fn(&mut VerifiableEntry),
}

impl LedgerRpc for MapGetRpc {
    fn verifiable_set(
        &self,
        db: &str,
        kvs: &[KvWrite],
        prove_since_tx: u64,
    ) -> vclient::Result<VerifiableTx> {
        self.inner.verifiable_set(db, kvs, prove_since_tx)
    }

    fn verifiable_get(
        &self,
        db: &str,
        key: &[u8],
        prove_since_tx: u64,
    ) -> vclient::Result<VerifiableEntry> {
        let mut ve = self.inner.verifiable_get(db, key, prove_since_tx)?;
        (self.rewrite)(&mut ve);
        Ok(ve)
    }

    fn verifiable_set_reference(
        &self,
        db: &str,
        key: &[u8],
        referenced_key: &[u8],
        bound_tx: u64,
        prove_since_tx: u64,
    ) -> vclient::Result<VerifiableTx> {
        self.inner
            .verifiable_set_reference(db, key, referenced_key, bound_tx, prove_since_tx)
    }

    fn verifiable_zadd(
        &self,
        db: &str,
        set: &[u8],
        score: f64,
        key: &[u8],
        bound_tx: u64,
        prove_since_tx: u64,
    ) -> vclient::Result<VerifiableTx> {
        self.inner
            .verifiable_zadd(db, set, score, key, bound_tx, prove_since_tx)
    }

    fn verifiable_tx_by_id(
        &self,
        db: &str,
        tx_id: u64,
        prove_since_tx: u64,
    ) -> vclient::Result<VerifiableTx> {
        self.inner.verifiable_tx_by_id(db, tx_id, prove_since_tx)
    }
}

#[test]
fn missing_dual_proof_is_malformed() {
    let rpc = MapGetRpc {
        inner: MockLedger::new(),
        rewrite: |ve| ve.dual_proof = None,
    };
    let c = VerifiedClient::new(rpc, InMemoryStateStore::new());
    c.verified_set(DB, b"k1", b"v1").unwrap();

    match c.verified_get(DB, b"k1") {
        Err(ClientError::MalformedProof(_)) => {}
        other => panic!("expected malformed proof, got {other:?}"),
    }
}

#[test]
fn unknown_header_version_fails_before_any_comparison() {
    let rpc = MapGetRpc {
        inner: MockLedger::new(),
        rewrite: |ve| ve.tx_header.version = 9,
    };
    let c = VerifiedClient::new(rpc, InMemoryStateStore::new());
    c.verified_set(DB, b"k1", b"v1").unwrap();

    match c.verified_get(DB, b"k1") {
        Err(ClientError::Proof(vledger::ProofError::UnsupportedTxVersion(9))) => {}
        other => panic!("expected unsupported version, got {other:?}"),
    }
}

#[test]
fn swapped_value_cannot_ride_an_honest_proof() {
    let rpc = MapGetRpc {
        inner: MockLedger::new(),
        rewrite: |ve| ve.entry.value = b"forged".to_vec(),
    };
    let c = VerifiedClient::new(rpc, InMemoryStateStore::new());
    c.verified_set(DB, b"k1", b"v1").unwrap();

    match c.verified_get(DB, b"k1") {
        Err(ClientError::VerificationFailed(_)) => {}
        other => panic!("expected verification failure, got {other:?}"),
    }
}

#[test]
fn concurrent_writes_serialize_on_the_anchor() {
    let c = Arc::new(client());
    const PER_THREAD: usize = 8;

    thread::scope(|s| {
        for t in 0..2 {
            let c = Arc::clone(&c);
            s.spawn(move || {
                for i in 0..PER_THREAD {
                    let key = format!("t{t}-k{i}");
                    c.verified_set(DB, key.as_bytes(), b"v").unwrap();
                }
            });
        }
    });

    // every write verified and advanced the shared anchor exactly once
    assert_eq!(c.current_state(DB).unwrap().tx_id, 2 * PER_THREAD as u64);
}

#[test]
fn anchors_survive_via_the_file_store() {
    let dir = std::env::temp_dir().join(format!("vclient-it-{}", std::process::id()));

    // single-process use only: FileStateStore does no cross-process
    // locking, so two clients must at least share one VerifiedClient (and
    // its per-database lock) to write safely
    {
        let store = FileStateStore::new(&dir).unwrap();
        let c = VerifiedClient::new(MockLedger::new(), store);
        c.verified_set(DB, b"k1", b"v1").unwrap();
        c.verified_set(DB, b"k2", b"v2").unwrap();
    }

    let store = FileStateStore::new(&dir).unwrap();
    let state = store.load(DB).unwrap().unwrap();
    assert_eq!(state.tx_id, 2);

    std::fs::remove_dir_all(&dir).unwrap();
}
