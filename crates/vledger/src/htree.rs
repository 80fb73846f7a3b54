//! Per-transaction binary Merkle tree.
//!
//! Built once over the ordered entry digests of a single transaction; the
//! root is the entries hash (`eh`) committed into the transaction header.
//! An unpaired last node is promoted unchanged to the next level — there
//! is no padding hash, so two trees over the same digest sequence always
//! produce the same root.

use serde::{Deserialize, Serialize};

use crate::digest::{leaf_digest, node_digest, Digest};
use crate::{ProofError, Result};

/// Sibling-path evidence that one leaf belongs to a tree with a given
/// root. Only meaningful for the tree width it was extracted at.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InclusionProof {
    pub leaf: usize,
    pub width: usize,
    /// Sibling subtree digests, ordered bottom-up.
    pub terms: Vec<Digest>,
}

pub struct HTree {
    /// levels[0] holds the hashed leaves, the last level the root.
    levels: Vec<Vec<Digest>>,
    max_width: usize,
    width: usize,
}

impl HTree {
    pub fn new(max_width: usize) -> Result<Self> {
        if max_width < 1 {
            return Err(ProofError::IllegalArguments("max_width must be at least 1"));
        }
        Ok(Self {
            levels: Vec::new(),
            max_width,
            width: 0,
        })
    }

    /// Build the tree over the ordered entry digests of one transaction.
    pub fn build_with(&mut self, digests: &[Digest]) -> Result<()> {
        if digests.is_empty() {
            return Err(ProofError::EmptyTree);
        }
        if digests.len() > self.max_width {
            return Err(ProofError::MaxWidthExceeded);
        }

        let mut level: Vec<Digest> = digests.iter().map(|d| leaf_digest(d)).collect();
        self.levels.clear();

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut i = 0;
            while i + 1 < level.len() {
                next.push(node_digest(&level[i], &level[i + 1]));
                i += 2;
            }
            if i < level.len() {
                // odd node promoted unchanged
                next.push(level[i]);
            }
            self.levels.push(level);
            level = next;
        }
        self.levels.push(level);
        self.width = digests.len();
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Root of the built tree. A single-entry tree's root is its leaf
    /// digest.
    pub fn root(&self) -> Result<Digest> {
        if self.width == 0 {
            return Err(ProofError::EmptyTree);
        }
        Ok(self.levels[self.levels.len() - 1][0])
    }

    /// Inclusion proof for the leaf at `i`, terms ordered bottom-up.
    pub fn inclusion_proof(&self, i: usize) -> Result<InclusionProof> {
        if self.width == 0 {
            return Err(ProofError::EmptyTree);
        }
        if i >= self.width {
            return Err(ProofError::IndexOutOfRange);
        }
        let mut terms = Vec::new();
        self.collect_terms(0, self.width, i, &mut terms);
        Ok(InclusionProof {
            leaf: i,
            width: self.width,
            terms,
        })
    }

    // Bisect [lo, hi) at the largest power of two below its size, descend
    // toward the leaf, record the sibling subtree root at each split.
    fn collect_terms(&self, lo: usize, hi: usize, i: usize, terms: &mut Vec<Digest>) {
        if hi - lo < 2 {
            return;
        }
        let k = largest_power_of_two_below(hi - lo);
        if i < lo + k {
            self.collect_terms(lo, lo + k, i, terms);
            terms.push(self.range_root(lo + k, hi));
        } else {
            self.collect_terms(lo + k, hi, i, terms);
            terms.push(self.range_root(lo, lo + k));
        }
    }

    // Root of the subtree covering [lo, hi). With promotion the node sits
    // at level ceil(log2(span)), index lo >> level, even for the ragged
    // rightmost range.
    fn range_root(&self, lo: usize, hi: usize) -> Digest {
        let level = ceil_log2(hi - lo);
        self.levels[level][lo >> level]
    }
}

/// Recompute the root from one leaf and its sibling path.
///
/// Independent of tree construction: folds the terms bottom-up, choosing
/// the concatenation order from the leaf/width index walk — an even index
/// that is not the last node of its level is a left child. Accepts only
/// if the fold lands on `root` with both indices collapsed to the same
/// node.
pub fn verify_inclusion(proof: &InclusionProof, digest: &Digest, root: &Digest) -> bool {
    if proof.width == 0 || proof.leaf >= proof.width {
        return false;
    }

    let mut calc = leaf_digest(digest);
    let mut i = proof.leaf;
    let mut r = proof.width - 1;

    for t in &proof.terms {
        if i % 2 == 0 && i != r {
            calc = node_digest(&calc, t);
        } else {
            calc = node_digest(t, &calc);
        }
        i >>= 1;
        r >>= 1;
    }

    i == r && calc == *root
}

/// Largest power of two strictly below `n`; requires `n >= 2`.
pub(crate) fn largest_power_of_two_below(n: usize) -> usize {
    1 << (usize::BITS as usize - 1 - (n - 1).leading_zeros() as usize)
}

pub(crate) fn ceil_log2(n: usize) -> usize {
    (usize::BITS - (n - 1).leading_zeros()) as usize
}
