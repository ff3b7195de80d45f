use serde::{Serialize, Deserialize};

use crate::types::{RawSignature, WireOutPoint};

/// Cooperative close request: the channel outpoint and the initiator's
/// signature over the shared close transaction.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub struct CloseReq {
    pub outpoint: WireOutPoint,
    pub sig: RawSignature,
}

/// The peer's counter-signature. By the time this arrives the close
/// transaction is already on the network.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
pub struct CloseResp {
    pub outpoint: WireOutPoint,
    pub sig: RawSignature,
}
