//! Append-only history tree.
//!
//! One leaf per committed transaction, in transaction order. The tree at
//! width `n` is the checkpoint a transaction header commits to through
//! `bl_tx_id` / `bl_root`. Positions are 1-based transaction ids and are
//! shifted to 0-based before any bit walk.
//!
//! The three verifications are total: degenerate ranges (`i == 0`,
//! `i > j`, an empty path where one is required) are expected while the
//! history is young and return `false` instead of panicking.

use crate::digest::{leaf_digest, node_digest, Digest};
use crate::htree::largest_power_of_two_below;
use crate::{ProofError, Result};

/// Inclusion of leaf `i` within the historical tree of width `j`.
///
/// `i_leaf` is the already leaf-hashed element; the fold mirrors the
/// per-transaction tree verification, with the index walk done on the
/// 0-based positions.
pub fn verify_inclusion(path: &[Digest], i: u64, j: u64, i_leaf: &Digest, j_root: &Digest) -> bool {
    if i == 0 || i > j || (i < j && path.is_empty()) {
        return false;
    }

    let mut i1 = i - 1;
    let mut j1 = j - 1;
    let mut calc = *i_leaf;

    for h in path {
        if i1 % 2 == 0 && i1 != j1 {
            calc = node_digest(&calc, h);
        } else {
            calc = node_digest(h, &calc);
        }
        i1 >>= 1;
        j1 >>= 1;
    }

    i1 == j1 && calc == *j_root
}

/// Consistency between the historical trees of widths `i <= j`: the
/// larger tree is the smaller one plus appended leaves.
///
/// The shared prefix is folded into two running roots seeded from
/// `path[0]` — one tracking the old boundary, one the new tree — and both
/// must land on their claimed values with the index walk exhausted.
pub fn verify_consistency(path: &[Digest], i: u64, j: u64, i_root: &Digest, j_root: &Digest) -> bool {
    if i > j || i == 0 || (i < j && path.is_empty()) {
        return false;
    }
    if i == j {
        return path.is_empty() && i_root == j_root;
    }

    let mut node = i - 1;
    let mut last = j - 1;
    while node % 2 == 1 {
        node >>= 1;
        last >>= 1;
    }

    let mut ci = path[0];
    let mut cj = path[0];

    for h in &path[1..] {
        if node % 2 == 1 || node == last {
            // both trees share this left sibling
            ci = node_digest(h, &ci);
            cj = node_digest(h, &cj);
            while node % 2 == 0 && node != 0 {
                node >>= 1;
                last >>= 1;
            }
        } else {
            // only the larger tree extends to the right
            cj = node_digest(&cj, h);
        }
        node >>= 1;
        last >>= 1;
    }

    ci == *i_root && cj == *j_root && last == 0
}

/// Proof that `leaf` is the rightmost element of the tree of width `i`.
///
/// The newest element is by definition the right operand of every combine
/// on its path, so each term folds as `H(0x01 || term || acc)`.
pub fn verify_last_inclusion(path: &[Digest], i: u64, leaf: &Digest, root: &Digest) -> bool {
    if i == 0 {
        return false;
    }

    let mut calc = *leaf;
    for h in path {
        calc = node_digest(h, &calc);
    }
    calc == *root
}

/// In-memory appender producing proofs the verifications above accept.
///
/// The server maintains the authoritative instance; this one backs the
/// mock ledger and the growth tests.
#[derive(Default)]
pub struct AHTree {
    leaves: Vec<Digest>,
}

impl AHTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next element; returns the new 1-based width.
    pub fn append(&mut self, data: &Digest) -> u64 {
        self.leaves.push(leaf_digest(data));
        self.leaves.len() as u64
    }

    pub fn size(&self) -> u64 {
        self.leaves.len() as u64
    }

    /// Root of the historical tree of width `n`.
    pub fn root_at(&self, n: u64) -> Result<Digest> {
        if n == 0 || n > self.size() {
            return Err(ProofError::IllegalArguments("width out of range"));
        }
        Ok(self.range_root(0, n as usize))
    }

    /// Sibling path for leaf `i` within the tree of width `j`, bottom-up.
    pub fn inclusion_proof(&self, i: u64, j: u64) -> Result<Vec<Digest>> {
        if i == 0 || i > j || j > self.size() {
            return Err(ProofError::IllegalArguments("inclusion range out of bounds"));
        }
        let mut path = Vec::new();
        self.collect_inclusion(0, j as usize, (i - 1) as usize, &mut path);
        Ok(path)
    }

    /// Consistency path between historical widths `i <= j`; empty when
    /// `i == j`.
    pub fn consistency_proof(&self, i: u64, j: u64) -> Result<Vec<Digest>> {
        if i == 0 || i > j || j > self.size() {
            return Err(ProofError::IllegalArguments("consistency range out of bounds"));
        }
        let mut path = Vec::new();
        if i < j {
            self.collect_consistency(i as usize, 0, j as usize, &mut path);
        }
        Ok(path)
    }

    /// Left-sibling path binding the last element into the root of width
    /// `i`.
    pub fn last_inclusion_proof(&self, i: u64) -> Result<Vec<Digest>> {
        if i == 0 || i > self.size() {
            return Err(ProofError::IllegalArguments("width out of range"));
        }
        let mut path = Vec::new();
        self.collect_last(0, i as usize, &mut path);
        Ok(path)
    }

    fn range_root(&self, lo: usize, hi: usize) -> Digest {
        if hi - lo == 1 {
            return self.leaves[lo];
        }
        let k = largest_power_of_two_below(hi - lo);
        node_digest(&self.range_root(lo, lo + k), &self.range_root(lo + k, hi))
    }

    fn collect_inclusion(&self, lo: usize, hi: usize, idx: usize, path: &mut Vec<Digest>) {
        if hi - lo < 2 {
            return;
        }
        let k = largest_power_of_two_below(hi - lo);
        if idx < lo + k {
            self.collect_inclusion(lo, lo + k, idx, path);
            path.push(self.range_root(lo + k, hi));
        } else {
            self.collect_inclusion(lo + k, hi, idx, path);
            path.push(self.range_root(lo, lo + k));
        }
    }

    // m leaves of the old tree remain inside [lo, hi); the seed term (the
    // subtree holding the old boundary) is always emitted first.
    fn collect_consistency(&self, m: usize, lo: usize, hi: usize, path: &mut Vec<Digest>) {
        if m == hi - lo {
            path.push(self.range_root(lo, hi));
            return;
        }
        let k = largest_power_of_two_below(hi - lo);
        if m <= k {
            self.collect_consistency(m, lo, lo + k, path);
            path.push(self.range_root(lo + k, hi));
        } else {
            self.collect_consistency(m - k, lo + k, hi, path);
            path.push(self.range_root(lo, lo + k));
        }
    }

    fn collect_last(&self, lo: usize, hi: usize, path: &mut Vec<Digest>) {
        if hi - lo < 2 {
            return;
        }
        let k = largest_power_of_two_below(hi - lo);
        self.collect_last(lo + k, hi, path);
        path.push(self.range_root(lo, lo + k));
    }
}
