#![forbid(unsafe_code)]

//! Peer and watchtower messages. Every message is a single opcode byte
//! followed by a fixed layout body; `Message` is the tagged union over
//! all of them. Serialization goes through `binformat::BinarySD`.

pub mod types;
mod message;

pub use binformat::{BinarySD, WireError};

pub use self::types::{Hash160, Hash256, RawPublicKey, RawSignature, WireOutPoint};
pub use self::message::*;
