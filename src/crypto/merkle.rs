//! Merkle tree implementation
//!
//! Commits a block header to `[mining_tx.id] ++ [tx.id, ...]`.

use super::{hash_pair, Hash};
use serde::Serialize;

/// Compute the merkle root of a list of hashes
///
/// If the list is empty, returns zero hash.
/// If a level has an odd number of elements, its last element is duplicated.
pub fn compute_merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return Hash::zero();
    }

    let mut current_level: Vec<Hash> = hashes.to_vec();

    while current_level.len() > 1 {
        current_level = next_level(current_level);
    }

    current_level[0]
}

fn next_level(mut level: Vec<Hash>) -> Vec<Hash> {
    if level.len() % 2 == 1 {
        let last = level[level.len() - 1];
        level.push(last);
    }
    level
        .chunks(2)
        .map(|pair| hash_pair(&pair[0], &pair[1]))
        .collect()
}

/// One level of a merkle proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProofStep {
    /// Sibling hash at this level
    pub sibling: Hash,
    /// True when the sibling is the left partner of the pair
    pub sibling_is_left: bool,
}

/// Merkle inclusion proof for one id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MerkleProof {
    /// The id being proven
    pub leaf: Hash,
    /// Sibling hashes from leaf to root
    pub steps: Vec<ProofStep>,
    /// Root recomputed while building the proof
    pub root: Hash,
    /// Whether `root` equals the root the caller claimed
    pub matches_claimed_root: bool,
}

impl MerkleProof {
    /// Fold the sibling path back up to a root.
    pub fn compute_root(&self) -> Hash {
        self.steps.iter().fold(self.leaf, |current, step| {
            if step.sibling_is_left {
                hash_pair(&step.sibling, &current)
            } else {
                hash_pair(&current, &step.sibling)
            }
        })
    }

    /// Verify this proof against a root hash
    pub fn verify(&self, root: &Hash) -> bool {
        self.compute_root() == *root
    }
}

/// Build a merkle proof for `target` within `hashes`.
///
/// Returns `None` when `target` is not one of the hashes.
pub fn build_merkle_proof(target: &Hash, hashes: &[Hash], claimed_root: &Hash) -> Option<MerkleProof> {
    let mut index = hashes.iter().position(|h| h == target)?;
    let mut current_level: Vec<Hash> = hashes.to_vec();
    let mut steps = Vec::new();

    while current_level.len() > 1 {
        if current_level.len() % 2 == 1 {
            let last = current_level[current_level.len() - 1];
            current_level.push(last);
        }

        let sibling_is_left = index % 2 == 1;
        let sibling_index = if sibling_is_left { index - 1 } else { index + 1 };
        steps.push(ProofStep {
            sibling: current_level[sibling_index],
            sibling_is_left,
        });

        current_level = next_level(current_level);
        index /= 2;
    }

    let root = current_level[0];
    Some(MerkleProof {
        leaf: *target,
        steps,
        root,
        matches_claimed_root: root == *claimed_root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_bytes;

    fn make_hashes(n: usize) -> Vec<Hash> {
        (0..n).map(|i| hash_bytes(&i.to_le_bytes())).collect()
    }

    #[test]
    fn test_empty_merkle_root() {
        assert_eq!(compute_merkle_root(&[]), Hash::zero());
    }

    #[test]
    fn test_single_element_is_its_own_root() {
        let hashes = make_hashes(1);
        assert_eq!(compute_merkle_root(&hashes), hashes[0]);
    }

    #[test]
    fn test_two_elements() {
        let hashes = make_hashes(2);
        assert_eq!(compute_merkle_root(&hashes), hash_pair(&hashes[0], &hashes[1]));
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let hashes = make_hashes(3);
        let left = hash_pair(&hashes[0], &hashes[1]);
        let right = hash_pair(&hashes[2], &hashes[2]);
        assert_eq!(compute_merkle_root(&hashes), hash_pair(&left, &right));
    }

    #[test]
    fn test_proof_for_every_leaf() {
        for n in 1..12 {
            let hashes = make_hashes(n);
            let root = compute_merkle_root(&hashes);
            for leaf in &hashes {
                let proof = build_merkle_proof(leaf, &hashes, &root).unwrap();
                assert!(proof.matches_claimed_root);
                assert!(proof.verify(&root));
            }
        }
    }

    #[test]
    fn test_proof_missing_target() {
        let hashes = make_hashes(4);
        let root = compute_merkle_root(&hashes);
        assert!(build_merkle_proof(&hash_bytes(b"absent"), &hashes, &root).is_none());
    }

    #[test]
    fn test_proof_flags_wrong_claimed_root() {
        let hashes = make_hashes(5);
        let proof = build_merkle_proof(&hashes[4], &hashes, &hash_bytes(b"bogus")).unwrap();
        assert!(!proof.matches_claimed_root);
        assert_eq!(proof.root, compute_merkle_root(&hashes));
    }

    #[test]
    fn test_single_leaf_proof_has_no_steps() {
        let hashes = make_hashes(1);
        let proof = build_merkle_proof(&hashes[0], &hashes, &hashes[0]).unwrap();
        assert!(proof.steps.is_empty());
        assert!(proof.matches_claimed_root);
    }
}
