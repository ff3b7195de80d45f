use serde::{Serialize, Deserialize};

use crate::error::Error;
use crate::tree::{descend, left_child, right_child, TreeNode, MAX_HEIGHT, MAX_INDEX};

/// One serialized node: index (8, big endian) + height (1) + hash (32).
const NODE_SIZE: usize = 41;

/// ElkremReceiver holds the counterparty's revealed secrets. Secrets
/// arrive in post-order, so whenever the incoming node is the parent of
/// the two most recent peaks both children are recomputed from it and
/// checked byte for byte; the two peaks are then replaced by their
/// parent. The retained set is therefore at most one node per tree
/// level, and this consistency check is the only line of defense against
/// a counterparty claiming state n while refusing to reveal n-1.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ElkremReceiver {
    stack: Vec<TreeNode>,
}

impl ElkremReceiver {
    pub fn new() -> Self {
        ElkremReceiver { stack: Vec::new() }
    }

    /// up_to returns the number of hashes inserted so far, which is also
    /// the index the next insertion will be assigned.
    pub fn up_to(&self) -> u64 {
        self.stack.last().map(|n| n.index + 1).unwrap_or(0)
    }

    /// add_next appends the hash for the next post-order index. On any
    /// failure the receiver is left exactly as it was.
    pub fn add_next(&mut self, hash: [u8; 32]) -> Result<(), Error> {
        let index = self.up_to();
        if index > MAX_INDEX {
            return Err(Error::OutOfRange(index));
        }
        let t = self.stack.len();
        if t >= 2 && self.stack[t - 1].height == self.stack[t - 2].height {
            // two peaks of equal height: the incoming node must be their parent
            let left = &self.stack[t - 2];
            let right = &self.stack[t - 1];
            if left_child(&hash) != left.hash || right_child(&hash) != right.hash {
                return Err(Error::InconsistentHash { index });
            }
            let height = right.height + 1;
            self.stack.truncate(t - 2);
            self.stack.push(TreeNode { index, height, hash });
        } else {
            self.stack.push(TreeNode { index, height: 0, hash });
        }
        Ok(())
    }

    /// at_index re-derives the secret for any index already covered by a
    /// retained node.
    pub fn at_index(&self, i: u64) -> Result<[u8; 32], Error> {
        let node = self
            .stack
            .iter()
            .find(|n| n.covers(i))
            .ok_or(Error::OutOfRange(i))?;
        descend(i, node.index, node.height, node.hash)
    }

    /// to_bytes serializes the retained node set: a one byte node count,
    /// then index / height / hash per node.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.stack.len() * NODE_SIZE);
        buf.push(self.stack.len() as u8);
        for n in &self.stack {
            buf.extend_from_slice(&n.index.to_be_bytes());
            buf.push(n.height);
            buf.extend_from_slice(&n.hash);
        }
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.is_empty() {
            return Err(Error::BadSerialization);
        }
        let count = data[0] as usize;
        if data.len() != 1 + count * NODE_SIZE {
            return Err(Error::BadSerialization);
        }
        let mut stack = Vec::with_capacity(count);
        for c in data[1..].chunks(NODE_SIZE) {
            let mut index_bytes = [0u8; 8];
            index_bytes.copy_from_slice(&c[..8]);
            let index = u64::from_be_bytes(index_bytes);
            let height = c[8];
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&c[9..]);

            if index > MAX_INDEX || height > MAX_HEIGHT {
                return Err(Error::BadSerialization);
            }
            // a node of height h cannot sit at a post-order index lower
            // than the size of its own subtree
            if index + 2 < (1u64 << (height as u32 + 1)) {
                return Err(Error::BadSerialization);
            }
            if let Some(prev) = stack.last() {
                let prev: &TreeNode = prev;
                if index <= prev.index || height > prev.height {
                    return Err(Error::BadSerialization);
                }
            }
            stack.push(TreeNode { index, height, hash });
        }
        Ok(ElkremReceiver { stack })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::ElkremSender;

    fn filled(snd: &ElkremSender, n: u64) -> ElkremReceiver {
        let mut rcv = ElkremReceiver::new();
        for i in 0..n {
            rcv.add_next(snd.at_index(i).unwrap()).unwrap();
        }
        rcv
    }

    #[test]
    fn receives_in_order_and_rederives() {
        let snd = ElkremSender::new([0x42; 32]);
        let rcv = filled(&snd, 20);
        assert_eq!(rcv.up_to(), 20);
        for i in 0..20 {
            assert_eq!(rcv.at_index(i).unwrap(), snd.at_index(i).unwrap());
        }
    }

    #[test]
    fn retained_set_stays_small() {
        let snd = ElkremSender::new([0x42; 32]);
        let rcv = filled(&snd, 127);
        // 127 insertions collapse to at most one node per level
        assert!(rcv.to_bytes().len() < 1 + 8 * NODE_SIZE);
    }

    #[test]
    fn bogus_parent_rejected_and_state_unchanged() {
        let snd = ElkremSender::new([0x42; 32]);
        let mut rcv = filled(&snd, 2);
        let before = rcv.to_bytes();

        // index 2 is the parent of 0 and 1; a wrong hash must not stick
        let err = rcv.add_next([0xee; 32]).unwrap_err();
        assert_eq!(err, Error::InconsistentHash { index: 2 });
        assert_eq!(rcv.to_bytes(), before);

        // the true parent is still accepted afterwards
        rcv.add_next(snd.at_index(2).unwrap()).unwrap();
        assert_eq!(rcv.up_to(), 3);
    }

    #[test]
    fn unknown_index_fails() {
        let snd = ElkremSender::new([0x42; 32]);
        let rcv = filled(&snd, 5);
        assert_eq!(rcv.at_index(5), Err(Error::OutOfRange(5)));
        assert_eq!(rcv.at_index(100), Err(Error::OutOfRange(100)));
    }

    #[test]
    fn serialization_round_trip() {
        let snd = ElkremSender::new([0x37; 32]);
        for n in &[0u64, 1, 2, 3, 7, 8, 20] {
            let rcv = filled(&snd, *n);
            let restored = ElkremReceiver::from_bytes(&rcv.to_bytes()).unwrap();
            assert_eq!(restored.up_to(), *n);
            assert_eq!(restored.to_bytes(), rcv.to_bytes());
            if *n > 0 {
                assert_eq!(restored.at_index(*n - 1).unwrap(), snd.at_index(*n - 1).unwrap());
            }
        }
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        assert!(ElkremReceiver::from_bytes(&[]).is_err());
        assert!(ElkremReceiver::from_bytes(&[2, 0, 0]).is_err());

        // structurally broken: heights increasing along the stack
        let snd = ElkremSender::new([0x37; 32]);
        let rcv = filled(&snd, 3);
        let mut bytes = rcv.to_bytes();
        assert_eq!(bytes[0], 1);
        bytes[9] = MAX_HEIGHT + 1;
        assert!(ElkremReceiver::from_bytes(&bytes).is_err());
    }
}
