use serde::{Serialize, Deserialize};

use crate::error::Error;
use crate::tree::{descend, MAX_HEIGHT, MAX_INDEX};

/// ElkremSender produces the revocation secrets we hand to the
/// counterparty, one per channel state. Everything is derived on demand
/// from the single 32 byte root, so the sender needs no other storage.
#[derive(Clone, Serialize, Deserialize)]
pub struct ElkremSender {
    root: [u8; 32],
}

impl ElkremSender {
    pub fn new(root: [u8; 32]) -> Self {
        ElkremSender { root }
    }

    /// at_index produces the secret for state `i` by descending from the
    /// root. Deterministic: the same root and index always give the same
    /// secret.
    pub fn at_index(&self, i: u64) -> Result<[u8; 32], Error> {
        if i > MAX_INDEX {
            return Err(Error::OutOfRange(i));
        }
        descend(i, MAX_INDEX, MAX_HEIGHT, self.root)
    }
}
