use serde::{Serialize, Deserialize};

use crate::types::{Hash256, RawPublicKey, RawSignature, WireOutPoint};

/// Opens an update: the pusher's signature for the recipient's next
/// commitment, the amount being shifted, and the pusher's elkrem point
/// one past the new state, keeping the recipient's lookahead filled.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub struct DeltaSig {
    pub outpoint: WireOutPoint,
    pub delta: u32,
    pub sig: RawSignature,
    pub next_elk_point: RawPublicKey,
}

/// The recipient's half: its signature for the pusher's next commitment,
/// the revocation secret for the state it is leaving, and its own
/// lookahead elkrem point.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub struct SigRev {
    pub outpoint: WireOutPoint,
    pub sig: RawSignature,
    pub elk: Hash256,
    pub next_elk_point: RawPublicKey,
}

/// The pusher's closing revocation of its own previous state.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub struct Rev {
    pub outpoint: WireOutPoint,
    pub elk: Hash256,
}
