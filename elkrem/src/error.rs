use std::error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The index is beyond what this chain can produce or has received.
    OutOfRange(u64),
    /// The target node is not inside the subtree of the starting node.
    NotDerivable { from: u64, to: u64 },
    /// An inserted hash does not re-derive the nodes already held.
    InconsistentHash { index: u64 },
    /// Serialized receiver data is structurally invalid.
    BadSerialization,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::OutOfRange(index) => write!(f, "elkrem index {} is out of range", index),
            Error::NotDerivable { from, to } => {
                write!(f, "elkrem node {} is not derivable from node {}", to, from)
            }
            Error::InconsistentHash { index } => {
                write!(f, "elkrem hash at index {} is inconsistent with previous ones", index)
            }
            Error::BadSerialization => write!(f, "malformed serialized elkrem receiver"),
        }
    }
}

impl error::Error for Error {}
