#![forbid(unsafe_code)]

//! Pure transaction construction for the channel engine: the asymmetric
//! commitment, the cooperative close, and the grab (punishment)
//! transaction the watchtower assembles from a revoked broadcast.
//! Builders take channel data and yield unsigned transactions plus the
//! sighashes to sign; keys and signatures come from the caller.

pub mod tools;
pub mod derivation;

mod commit;
mod close;
mod grab;
mod error;

pub use self::commit::CommitTx;
pub use self::close::CloseTx;
pub use self::grab::GrabTx;
pub use self::error::Error;

/// Flat fee on the cooperative close, paid by the close initiator.
pub const CLOSE_TX_FEE: u64 = 1;

/// Flat fee on the grab transaction.
pub const GRAB_TX_FEE: u64 = 1;
