//! Merkle tree over block transactions
//!
//! Nodes are kept in one flat vector, level after level, leaves first. Each
//! level of size n produces ⌈n/2⌉ parents; an odd last node is paired with
//! itself. That duplication means two lists differing only by a repeated
//! trailing transaction share a root, which block validation must catch by
//! rejecting duplicate txids.

use crate::types::*;
use crate::hash::hash256_2;
use crate::transaction::calculate_tx_id;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerkleTree {
    nodes: Vec<Hash>,
    leaf_count: usize,
}

impl MerkleTree {
    /// BuildMerkleTree: 𝒯𝒳* → 𝕄
    pub fn build(transactions: &[Transaction]) -> Self {
        Self::from_leaves(transactions.iter().map(calculate_tx_id).collect())
    }

    pub fn from_leaves(leaves: Vec<Hash>) -> Self {
        let leaf_count = leaves.len();
        let mut nodes = leaves;
        let mut level_start = 0;
        let mut size = leaf_count;
        while size > 1 {
            for i in (0..size).step_by(2) {
                let i2 = (i + 1).min(size - 1);
                let parent = hash256_2(&nodes[level_start + i], &nodes[level_start + i2]);
                nodes.push(parent);
            }
            level_start += size;
            size = (size + 1) / 2;
        }
        MerkleTree { nodes, leaf_count }
    }

    /// Root hash; all zeros for an empty tree
    pub fn root(&self) -> Hash {
        self.nodes.last().copied().unwrap_or([0u8; 32])
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn nodes(&self) -> &[Hash] {
        &self.nodes
    }

    /// Sibling hashes from leaf `index` up to (not including) the root
    pub fn branch(&self, mut index: usize) -> Option<Vec<Hash>> {
        if index >= self.leaf_count {
            return None;
        }
        let mut branch = Vec::new();
        let mut level_start = 0;
        let mut size = self.leaf_count;
        while size > 1 {
            let sibling = (index ^ 1).min(size - 1);
            branch.push(self.nodes[level_start + sibling]);
            index >>= 1;
            level_start += size;
            size = (size + 1) / 2;
        }
        Some(branch)
    }

    /// Fold a branch bottom-up; a set low bit puts the sibling on the left.
    pub fn verify(leaf: Hash, branch: &[Hash], mut index: usize) -> Hash {
        let mut hash = leaf;
        for sibling in branch {
            hash = if index & 1 == 1 {
                hash256_2(sibling, &hash)
            } else {
                hash256_2(&hash, sibling)
            };
            index >>= 1;
        }
        hash
    }
}

/// Merkle root of a transaction list
pub fn calculate_merkle_root(transactions: &[Transaction]) -> Hash {
    MerkleTree::build(transactions).root()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u8) -> Vec<Hash> {
        (0..n).map(|i| [i; 32]).collect()
    }

    #[test]
    fn test_empty_tree_has_zero_root() {
        let tree = MerkleTree::from_leaves(vec![]);
        assert_eq!(tree.root(), [0u8; 32]);
        assert_eq!(tree.branch(0), None);
    }

    #[test]
    fn test_single_leaf_is_root() {
        let tree = MerkleTree::from_leaves(vec![[9; 32]]);
        assert_eq!(tree.root(), [9; 32]);
        assert_eq!(tree.branch(0), Some(vec![]));
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let l = leaves(3);
        let tree = MerkleTree::from_leaves(l.clone());
        let left = hash256_2(&l[0], &l[1]);
        let right = hash256_2(&l[2], &l[2]);
        assert_eq!(tree.root(), hash256_2(&left, &right));
        // 3 leaves + 2 parents + root
        assert_eq!(tree.nodes().len(), 6);
    }

    #[test]
    fn test_duplicated_tail_collides() {
        let mut l = leaves(3);
        let a = MerkleTree::from_leaves(l.clone()).root();
        l.push(l[2]);
        let b = MerkleTree::from_leaves(l).root();
        assert_eq!(a, b);
    }

    #[test]
    fn test_branch_verifies_for_every_index() {
        for n in 1..=9u8 {
            let tree = MerkleTree::from_leaves(leaves(n));
            for i in 0..n as usize {
                let branch = tree.branch(i).unwrap();
                assert_eq!(MerkleTree::verify([i as u8; 32], &branch, i), tree.root());
            }
        }
    }

    #[test]
    fn test_wrong_index_fails_verification() {
        let tree = MerkleTree::from_leaves(leaves(4));
        let branch = tree.branch(1).unwrap();
        assert_ne!(MerkleTree::verify([1; 32], &branch, 2), tree.root());
    }

    #[test]
    fn test_out_of_range_branch() {
        let tree = MerkleTree::from_leaves(leaves(5));
        assert!(tree.branch(5).is_none());
    }
}
