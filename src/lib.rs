#![forbid(unsafe_code)]

//! pcd: an off-chain payment channel node core and its companion
//! watchtower. The workspace splits by concern; this crate re-exports
//! the pieces an embedder wires together with its own wallet, peer
//! transport and block source.

pub use channel;
pub use elkrem;
pub use node;
pub use sorceror;
pub use wallet;
pub use wire;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
