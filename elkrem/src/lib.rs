#![forbid(unsafe_code)]

//! Elkrem is a compact hash-tree scheme for revealing revocation secrets
//! in sequence. The sender holds a single secret root from which every
//! node of a binary tree is derived; secrets are handed out in post-order,
//! so each internal node proves all the leaves below it. The receiver
//! keeps only the peaks of what it has seen (O(log N) nodes) and can
//! re-derive any earlier secret, while rejecting any insertion that does
//! not hash down to the nodes it already holds.

mod tree;
mod sender;
mod receiver;
mod error;

pub use self::tree::{MAX_HEIGHT, MAX_INDEX};
pub use self::sender::ElkremSender;
pub use self::receiver::ElkremReceiver;
pub use self::error::Error;
