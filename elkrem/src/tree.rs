use bitcoin_hashes::{sha256d, Hash};
use serde::{Serialize, Deserialize};

use crate::error::Error;

/// Height of the tree. 2^48 states per channel is far more than any
/// channel will ever see, and keeps state numbers inside 6 bytes.
pub const MAX_HEIGHT: u8 = 47;

/// Post-order index of the root, 2^48 - 2. Node indices run 0..=MAX_INDEX.
pub const MAX_INDEX: u64 = (1u64 << (MAX_HEIGHT as u32 + 1)) - 2;

fn double_sha(data: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(data).to_byte_array()
}

/// Left child is the double-sha of the parent alone.
pub(crate) fn left_child(parent: &[u8; 32]) -> [u8; 32] {
    double_sha(&parent[..])
}

/// Right child appends a 0x01 byte before hashing, so siblings never
/// collide and neither child reveals the other.
pub(crate) fn right_child(parent: &[u8; 32]) -> [u8; 32] {
    let mut buf = [0u8; 33];
    buf[..32].copy_from_slice(&parent[..]);
    buf[32] = 0x01;
    double_sha(&buf[..])
}

/// descend walks from the node (from, height) down to the node with
/// post-order index `to`, applying the child hash at every step. The
/// children of node (i, h) are (i - 2^h, h-1) on the left and (i - 1, h-1)
/// on the right.
pub(crate) fn descend(to: u64, from: u64, height: u8, hash: [u8; 32]) -> Result<[u8; 32], Error> {
    if to > from {
        return Err(Error::NotDerivable { from, to });
    }
    let mut i = from;
    let mut h = height;
    let mut sha = hash;
    while i > to {
        if h == 0 {
            // ran out of tree without reaching the target
            return Err(Error::NotDerivable { from, to });
        }
        if to <= i - (1u64 << h) {
            sha = left_child(&sha);
            i -= 1u64 << h;
        } else {
            sha = right_child(&sha);
            i -= 1;
        }
        h -= 1;
    }
    Ok(sha)
}

/// A retained node of the receiver: the hash together with its position.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TreeNode {
    pub index: u64,
    pub height: u8,
    pub hash: [u8; 32],
}

impl TreeNode {
    /// Lowest post-order index inside this node's subtree.
    pub fn span_start(&self) -> u64 {
        self.index + 2 - (1u64 << (self.height as u32 + 1))
    }

    pub fn covers(&self, i: u64) -> bool {
        i >= self.span_start() && i <= self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_differ() {
        let parent = [0x5au8; 32];
        assert_ne!(left_child(&parent), right_child(&parent));
    }

    #[test]
    fn descend_to_self_is_identity() {
        let hash = [3u8; 32];
        assert_eq!(descend(6, 6, 2, hash).unwrap(), hash);
    }

    #[test]
    fn descend_follows_child_rule() {
        // In the 7 node tree rooted at index 6: node 2 is the left child,
        // node 5 the right child, node 4 the right child of node 5.
        let root = [9u8; 32];
        assert_eq!(descend(2, 6, 2, root).unwrap(), left_child(&root));
        assert_eq!(descend(5, 6, 2, root).unwrap(), right_child(&root));
        assert_eq!(descend(4, 6, 2, root).unwrap(), right_child(&right_child(&root)));
        assert_eq!(descend(0, 6, 2, root).unwrap(), left_child(&left_child(&root)));
    }

    #[test]
    fn descend_rejects_foreign_subtree() {
        // node 2 (height 1) spans indices 0..=2 only
        let hash = [1u8; 32];
        assert!(descend(3, 2, 1, hash).is_err());
        assert!(descend(7, 6, 2, hash).is_err());
    }

    #[test]
    fn span_bounds() {
        let n = TreeNode { index: 6, height: 2, hash: [0; 32] };
        assert_eq!(n.span_start(), 0);
        assert!(n.covers(0) && n.covers(6));
        let n = TreeNode { index: 5, height: 1, hash: [0; 32] };
        assert_eq!(n.span_start(), 3);
        assert!(!n.covers(2) && n.covers(3) && n.covers(5));
    }
}
