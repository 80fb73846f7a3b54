//! Dual proof: one end-to-end check that a target transaction is
//! reachable and consistent from a source transaction.
//!
//! Combines history-tree inclusion, consistency and last-inclusion with
//! the linear chain for the tail of transactions past the target's
//! checkpoint. Verification short-circuits on the first failure and never
//! panics on malformed input — a structurally broken proof is simply not
//! a proof.

use serde::{Deserialize, Serialize};

use crate::ahtree;
use crate::digest::{leaf_digest, Digest};
use crate::linear::{verify_linear_proof, LinearProof};
use crate::tx::TxHeader;

/// Bridge between two transaction ids `source <= target`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DualProof {
    pub source_tx_header: TxHeader,
    pub target_tx_header: TxHeader,
    /// History-tree inclusion of the source ALH, present when the source
    /// predates the target's checkpoint.
    pub inclusion_proof: Vec<Digest>,
    /// Consistency between the two headers' checkpoints.
    pub consistency_proof: Vec<Digest>,
    /// ALH of the transaction at the target's checkpoint.
    pub target_bl_tx_alh: Digest,
    /// Last-inclusion of `target_bl_tx_alh` in the target's checkpoint.
    pub last_inclusion_proof: Vec<Digest>,
    pub linear_proof: Option<LinearProof>,
}

/// Verify that `target_alh` extends `source_alh`.
///
/// The recomputed header ALHs are compared against the caller's anchors
/// first: without that, self-consistent but unrelated headers would pass.
/// Steps over an empty history (`bl_tx_id == 0`) are skipped, not
/// presumed to hold.
pub fn verify_dual_proof(
    proof: &DualProof,
    source_tx_id: u64,
    target_tx_id: u64,
    source_alh: &Digest,
    target_alh: &Digest,
) -> bool {
    let source = &proof.source_tx_header;
    let target = &proof.target_tx_header;

    if source.id != source_tx_id || target.id != target_tx_id {
        return false;
    }
    if source.id == 0 || source.id > target.id {
        return false;
    }

    let (Ok(calc_source_alh), Ok(calc_target_alh)) = (source.alh(), target.alh()) else {
        return false;
    };
    if *source_alh != calc_source_alh || *target_alh != calc_target_alh {
        return false;
    }

    if source_tx_id < target.bl_tx_id {
        let included = ahtree::verify_inclusion(
            &proof.inclusion_proof,
            source_tx_id,
            target.bl_tx_id,
            &leaf_digest(source_alh),
            &target.bl_root,
        );
        if !included {
            return false;
        }
    }

    if source.bl_tx_id > 0 {
        let consistent = ahtree::verify_consistency(
            &proof.consistency_proof,
            source.bl_tx_id,
            target.bl_tx_id,
            &source.bl_root,
            &target.bl_root,
        );
        if !consistent {
            return false;
        }
    }

    if target.bl_tx_id > 0 {
        let last = ahtree::verify_last_inclusion(
            &proof.last_inclusion_proof,
            target.bl_tx_id,
            &leaf_digest(&proof.target_bl_tx_alh),
            &target.bl_root,
        );
        if !last {
            return false;
        }
    }

    let Some(linear) = &proof.linear_proof else {
        return false;
    };

    if source_tx_id < target.bl_tx_id {
        verify_linear_proof(
            linear,
            target.bl_tx_id,
            target_tx_id,
            &proof.target_bl_tx_alh,
            target_alh,
        )
    } else {
        verify_linear_proof(linear, source_tx_id, target_tx_id, source_alh, target_alh)
    }
}
