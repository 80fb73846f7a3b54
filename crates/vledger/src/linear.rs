//! Linear proof: the accumulated-log-hash chain over transactions newer
//! than the last history-tree checkpoint.

use serde::{Deserialize, Serialize};

use crate::digest::{sha256, Digest};

/// Hash chain over consecutive accumulated log hashes. `terms[0]` is the
/// source ALH; term `k` is the inner hash of transaction `source + k`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinearProof {
    pub source_tx_id: u64,
    pub target_tx_id: u64,
    pub terms: Vec<Digest>,
}

/// Rebuild the ALH chain link by link from `source_alh` and compare the
/// final accumulator against `target_alh`.
pub fn verify_linear_proof(
    proof: &LinearProof,
    source_tx_id: u64,
    target_tx_id: u64,
    source_alh: &Digest,
    target_alh: &Digest,
) -> bool {
    if proof.source_tx_id != source_tx_id || proof.target_tx_id != target_tx_id {
        return false;
    }
    if source_tx_id == 0 || source_tx_id > target_tx_id {
        return false;
    }
    if proof.terms.is_empty() || proof.terms[0] != *source_alh {
        return false;
    }
    if proof.terms.len() as u64 != target_tx_id - source_tx_id + 1 {
        return false;
    }

    let mut calc = proof.terms[0];
    for (k, term) in proof.terms.iter().enumerate().skip(1) {
        let mut b = Vec::with_capacity(8 + 64);
        b.extend_from_slice(&(source_tx_id + k as u64).to_be_bytes());
        b.extend_from_slice(&calc);
        b.extend_from_slice(term);
        calc = sha256(&b);
    }

    calc == *target_alh
}

#[cfg(test)]
mod tests {
    use super::*;

    // replays the server-side chain: alh(t) = H(t || alh(t-1) || inner(t))
    fn chain(source: u64, target: u64) -> (LinearProof, Digest, Digest) {
        let source_alh = sha256(format!("alh-{source}").as_bytes());
        let mut terms = vec![source_alh];
        let mut alh = source_alh;
        for t in source + 1..=target {
            let inner = sha256(format!("inner-{t}").as_bytes());
            let mut b = Vec::new();
            b.extend_from_slice(&t.to_be_bytes());
            b.extend_from_slice(&alh);
            b.extend_from_slice(&inner);
            alh = sha256(&b);
            terms.push(inner);
        }
        (
            LinearProof { source_tx_id: source, target_tx_id: target, terms },
            source_alh,
            alh,
        )
    }

    #[test]
    fn valid_chain_verifies() {
        let (proof, source_alh, target_alh) = chain(3, 9);
        assert!(verify_linear_proof(&proof, 3, 9, &source_alh, &target_alh));
    }

    #[test]
    fn single_transaction_bridge() {
        let (proof, source_alh, target_alh) = chain(5, 5);
        assert_eq!(proof.terms.len(), 1);
        assert!(verify_linear_proof(&proof, 5, 5, &source_alh, &target_alh));
    }

    #[test]
    fn declared_ids_must_match_arguments() {
        let (proof, source_alh, target_alh) = chain(3, 9);
        assert!(!verify_linear_proof(&proof, 4, 9, &source_alh, &target_alh));
        assert!(!verify_linear_proof(&proof, 3, 8, &source_alh, &target_alh));
    }

    #[test]
    fn zero_or_inverted_range_fails() {
        let (mut proof, source_alh, target_alh) = chain(3, 9);
        proof.source_tx_id = 0;
        assert!(!verify_linear_proof(&proof, 0, 9, &source_alh, &target_alh));

        let (mut proof, source_alh, target_alh) = chain(3, 9);
        proof.source_tx_id = 10;
        assert!(!verify_linear_proof(&proof, 10, 9, &source_alh, &target_alh));
    }

    #[test]
    fn first_term_must_be_the_source_alh() {
        let (proof, _, target_alh) = chain(3, 9);
        let other = sha256(b"unrelated");
        assert!(!verify_linear_proof(&proof, 3, 9, &other, &target_alh));
    }

    #[test]
    fn term_count_must_cover_the_range() {
        let (mut proof, source_alh, target_alh) = chain(3, 9);
        proof.terms.pop();
        assert!(!verify_linear_proof(&proof, 3, 9, &source_alh, &target_alh));
    }

    #[test]
    fn tampered_term_fails() {
        let (mut proof, source_alh, target_alh) = chain(3, 9);
        proof.terms[4][12] ^= 0x01;
        assert!(!verify_linear_proof(&proof, 3, 9, &source_alh, &target_alh));
    }
}
