#![forbid(unsafe_code)]

//! The sorceror: a watchtower store. Channel owners feed it one
//! descriptor per channel and one small message per revoked state; the
//! block ingester asks it about every txid it sees. On a hit the store
//! returns everything needed to rebuild and sign the grab transaction
//! that sweeps the cheater's broadcast.
//!
//! Three namespaces, mirroring the classic layout: a channel-index to
//! destination map for enumeration, per-channel data (static identity,
//! elkrem receiver, index) keyed by destination PKH, and the big one:
//! a truncated-txid index holding one 74 byte record per revoked state
//! across all watched channels.

mod descriptor;
mod store;
mod error;

pub use self::descriptor::{ChanStatic, IdxSig, IDX_SIG_SIZE, STATIC_SIZE};
pub use self::store::{PunishCandidate, Sorceror};
pub use self::error::Error;
